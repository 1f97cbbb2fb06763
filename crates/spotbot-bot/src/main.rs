//! spotbot - conversational spot-trading assistant. Entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Conversational spot-trading assistant.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SPOTBOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    spotbot_telemetry::init_logging()?;

    info!("starting spotbot v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > SPOTBOT_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SPOTBOT_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "loading configuration");
    let config = spotbot_bot::AppConfig::load(&config_path)?;

    let app = spotbot_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
