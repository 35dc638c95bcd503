//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8980;

/// Fixed destination used when none is configured.
pub const DEFAULT_DESTINATION: &str = "/tmp/uploaded-file";

/// Settings threaded through the server and its handlers.
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes. Durations are written as `500ms`, `30s`, `1m` or `1m30s`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Deadline for routes other than the upload endpoint. Zero disables it.
    #[serde(deserialize_with = "de_duration")]
    pub api_timeout: Duration,
    /// Deadline for receiving a request's headers. Zero disables it.
    #[serde(deserialize_with = "de_duration")]
    pub header_read_timeout: Duration,
    /// Pause injected after every 32 000 bytes of body read. Zero disables
    /// throttling.
    #[serde(deserialize_with = "de_duration")]
    pub upload_delay: Duration,
    /// How long in-flight requests get to finish once shutdown starts.
    #[serde(deserialize_with = "de_duration")]
    pub shutdown_timeout: Duration,
    pub destination: Destination,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_timeout: Duration::from_secs(30),
            header_read_timeout: Duration::from_secs(30),
            upload_delay: Duration::ZERO,
            shutdown_timeout: Duration::from_secs(3),
            destination: Destination::default(),
        }
    }
}

/// Where uploaded payloads are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Destination {
    /// Every upload overwrites the same file.
    ///
    /// Concurrent uploads race on it and the last writer wins.
    Fixed { path: PathBuf },
    /// Every upload gets a new `upload-XXXXXX` file in `dir`.
    Unique { dir: PathBuf },
}

impl Default for Destination {
    fn default() -> Self {
        Self::Fixed {
            path: PathBuf::from(DEFAULT_DESTINATION),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration: {0:?}")]
pub struct InvalidDuration(pub String);

/// Parses a duration such as `0`, `250ms`, `30s`, `1m` or `1h30m`.
pub fn parse_duration(input: &str) -> Result<Duration, InvalidDuration> {
    let s = input.trim();
    let invalid = || InvalidDuration(input.to_string());
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            _ => return Err(invalid()),
        };
        total = unit
            .and_then(|unit| total.checked_add(unit))
            .ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}
