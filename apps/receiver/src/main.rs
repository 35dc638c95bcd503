//! Upload receiver entry point.

mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pipeload_server::{UploadServer, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = settings::Args::parse();

    let level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
    tracing::debug!("debug mode is on");

    let config = settings::resolve(&args)?;
    tracing::debug!(
        api_timeout = ?config.api_timeout,
        header_read_timeout = ?config.header_read_timeout,
        upload_delay = ?config.upload_delay,
        shutdown_timeout = ?config.shutdown_timeout,
        destination = ?config.destination,
        "timeouts set"
    );

    let server = UploadServer::new(config);
    if let Err(e) = server.run(shutdown_signal()).await {
        tracing::error!("fatal error during server run: {e}");
        return Err(e.into());
    }
    Ok(())
}
