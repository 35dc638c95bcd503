//! Streams one file to an upload server.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use pipeload_client::{DEFAULT_ENDPOINT, TransferAttributes, Uploader, UploaderConfig};

#[derive(Debug, Parser)]
#[command(name = "pipeload-upload", version, about = "Stream a file to an upload server")]
struct Args {
    /// Endpoint to upload the file to.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// File to upload.
    #[arg(long, short = 'f')]
    filename: PathBuf,

    /// Extra form field sent before the file, as `key=value`. Repeatable.
    #[arg(long = "attr", short = 'a', value_parser = parse_attribute)]
    attributes: Vec<(String, String)>,

    /// Do not draw a progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Log at debug level.
    #[arg(long)]
    debug: bool,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
    tracing::debug!("debug mode is on");

    let uploader = Uploader::new(UploaderConfig {
        endpoint: args.endpoint.clone(),
        show_progress: !args.no_progress,
    })
    .context("failed to build HTTP client")?;
    let attributes: TransferAttributes = args.attributes.into_iter().collect();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    tracing::debug!(file = %args.filename.display(), endpoint = %args.endpoint, "uploading");
    let report = uploader
        .upload_file(&args.filename, &attributes, cancel)
        .await
        .inspect_err(|e| tracing::error!("upload failed: {e}"))
        .with_context(|| format!("failed to upload {}", args.filename.display()))?;

    tracing::info!(
        bytes = report.bytes_sent,
        status = report.status,
        response = report.response.trim_end(),
        "upload finished"
    );
    Ok(())
}

/// Fires `cancel` on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if result.is_err() {
                return;
            }
            tracing::info!("SIGINT received, cancelling upload");
        }
        _ = terminate => tracing::info!("SIGTERM received, cancelling upload"),
    }
    cancel.cancel();
}
