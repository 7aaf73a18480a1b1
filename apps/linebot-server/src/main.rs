mod app;
mod cli;
mod server;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use crate::app::App;
use crate::cli::Args;
use crate::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let args = Args::parse();

    // Configuration decides the log level, so it is loaded before telemetry
    let config = app::load_config(&args)?;
    init_telemetry(&config.telemetry)?;

    info!("Starting LINE webhook server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let result = run_application(config).await;

    if let Err(ref e) = result {
        error!("Application error: {:#}", e);
    }

    info!("Server shutdown complete");

    result
}

async fn run_application(config: linebot_core::AppConfig) -> Result<()> {
    let app = App::build(config)?;
    app.run().await?;

    Ok(())
}
