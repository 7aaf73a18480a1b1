//! Telemetry initialization (logging)

use anyhow::{Context, Result};
use linebot_core::TelemetryConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging stack. `RUST_LOG` wins over the configured level.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Failed to create environment filter")?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true),
            )
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}
