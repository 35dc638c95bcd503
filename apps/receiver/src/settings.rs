//! Server settings: optional TOML file, then command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use pipeload_server::{Destination, ServerConfig, parse_duration};

#[derive(Debug, Parser)]
#[command(name = "pipeload-server", version, about = "Receive streamed file uploads")]
pub struct Args {
    /// TOML file with server settings. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Port to run the server on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Timeout for API calls other than uploads (e.g. `30s`, `0` to disable).
    #[arg(long, value_parser = parse_duration)]
    pub api_timeout: Option<Duration>,

    /// Timeout for reading request headers.
    #[arg(long = "header-timeout", value_parser = parse_duration)]
    pub header_timeout: Option<Duration>,

    /// Delay injected every 32 KB of upload data (10ms is roughly 3 MB/s).
    #[arg(long, value_parser = parse_duration)]
    pub upload_delay: Option<Duration>,

    /// Grace period for in-flight requests on shutdown.
    #[arg(long, value_parser = parse_duration)]
    pub shutdown_timeout: Option<Duration>,

    /// Write every upload to this file, replacing the previous one.
    #[arg(long, conflicts_with = "upload_dir")]
    pub destination: Option<PathBuf>,

    /// Write every upload to a new file in this directory.
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long)]
    pub debug: bool,
}

/// Reads a TOML config file.
pub fn load_file(path: &Path) -> anyhow::Result<ServerConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Builds the effective configuration.
pub fn resolve(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => load_file(path)?,
        None => ServerConfig::default(),
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(d) = args.api_timeout {
        config.api_timeout = d;
    }
    if let Some(d) = args.header_timeout {
        config.header_read_timeout = d;
    }
    if let Some(d) = args.upload_delay {
        config.upload_delay = d;
    }
    if let Some(d) = args.shutdown_timeout {
        config.shutdown_timeout = d;
    }
    if let Some(path) = &args.destination {
        config.destination = Destination::Fixed { path: path.clone() };
    }
    if let Some(dir) = &args.upload_dir {
        config.destination = Destination::Unique { dir: dir.clone() };
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("pipeload-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_without_flags() {
        let config = resolve(&parse(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = resolve(&parse(&[
            "--port",
            "9001",
            "--api-timeout",
            "0",
            "--header-timeout",
            "5s",
            "--upload-delay",
            "10ms",
        ]))
        .unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.api_timeout, Duration::ZERO);
        assert_eq!(config.header_read_timeout, Duration::from_secs(5));
        assert_eq!(config.upload_delay, Duration::from_millis(10));
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(
            &path,
            "port = 7000\nupload_delay = \"1s\"\n\n[destination]\nmode = \"fixed\"\npath = \"/srv/upload\"\n",
        )
        .unwrap();

        let args = parse(&[
            "--config",
            path.to_str().unwrap(),
            "--upload-delay",
            "5ms",
            "--upload-dir",
            "/srv/uploads",
        ]);
        let config = resolve(&args).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.upload_delay, Duration::from_millis(5));
        assert_eq!(
            config.destination,
            Destination::Unique {
                dir: PathBuf::from("/srv/uploads")
            }
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let args = parse(&["--config", "/definitely/not/here.toml"]);
        let err = resolve(&args).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn bad_duration_flag() {
        assert!(Args::try_parse_from(["pipeload-server", "--upload-delay", "fast"]).is_err());
    }

    #[test]
    fn destination_modes_conflict() {
        assert!(
            Args::try_parse_from([
                "pipeload-server",
                "--destination",
                "/tmp/a",
                "--upload-dir",
                "/tmp"
            ])
            .is_err()
        );
    }
}
