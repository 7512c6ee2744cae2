//! lagarb entry point.
//!
//! Paper trading: decisions are published and orders are built from
//! templates, then handed to the paper execution sink.

use anyhow::Result;
use clap::Parser;
use lagarb_bot::{AppConfig, Application};
use tracing::info;

/// Live/reference divergence engine for prediction markets
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LAGARB_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the first websocket or HTTPS connection
    lagarb_feed::init_crypto();

    let args = Args::parse();
    lagarb_telemetry::init_logging()?;

    info!("Starting lagarb v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config.as_deref())?;
    info!(
        namespace = %config.namespace,
        symbols = ?config.watchlist.iter().map(|w| &w.symbol).collect::<Vec<_>>(),
        data_dir = %config.persistence.data_dir,
        "Configuration loaded"
    );

    Application::new(config)?.run().await?;
    Ok(())
}
