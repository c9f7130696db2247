//! bybit-tape recorder - Entry Point
//!
//! Records Bybit public trades and liquidations to append-only CSV logs.
//! Exits 0 on graceful shutdown; when the restart bound is exceeded the
//! exit status is the restart count.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Bybit trade and liquidation tape recorder
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TAPE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Directory for trade.csv and liquidation.csv (overrides the config file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize TLS crypto provider (must be before any WS connections)
    tape_ws::init_crypto();

    let args = Args::parse();

    tape_telemetry::init_logging()?;

    info!("Starting bybit-tape recorder v{}", env!("CARGO_PKG_VERSION"));

    // Determine config path: CLI arg > TAPE_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TAPE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let mut config = tape_recorder::AppConfig::load(&config_path)?;
    if let Some(output_dir) = args.output_dir {
        config.persistence.output_dir = output_dir;
    }
    config.validate()?;
    info!(ws_url = %config.ws_url, symbol = %config.topics.symbol, "Configuration loaded");

    let exit = tape_recorder::Application::new(config).run().await?;

    Ok(ExitCode::from(exit.exit_code()))
}
