//! Application state and initialization

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use linebot_core::AppConfig;
use linebot_webhook::{Event, EventHandler, EventHandlerRegistry, HandlerError};

use crate::cli::Args;
use crate::server::Server;

/// Load configuration from the file named on the command line (if any) and
/// the environment, then apply flag overrides
pub fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration from environment")?,
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = &args.webhook_path {
        config.channel.webhook_path = path.clone();
    }
    if let Some(level) = &args.log_level {
        config.telemetry.log_level = level.clone();
    }
    if args.json_logs {
        config.telemetry.json_logs = true;
    }

    anyhow::ensure!(
        config.channel.webhook_path.starts_with('/'),
        "webhook path must start with '/': {}",
        config.channel.webhook_path
    );

    Ok(config)
}

/// Logs every event it is handed
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        match event {
            Event::Unknown(unknown) => warn!(
                event_type = unknown.event_type.as_deref().unwrap_or("<none>"),
                reason = unknown.reason.as_str(),
                "Received event that could not be decoded"
            ),
            _ => info!(
                event_type = event.event_type().unwrap_or("<none>"),
                source = event.source().and_then(|s| s.sender_id()).unwrap_or("<none>"),
                redelivery = event.envelope().map(|e| e.is_redelivery()).unwrap_or(false),
                "Received event"
            ),
        }
        Ok(())
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub handlers: Arc<EventHandlerRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        info!("Initializing application components");

        if config.channel.secret.is_empty() {
            warn!("Channel secret is not configured; every webhook will be rejected");
        }

        let handlers =
            EventHandlerRegistry::new().with_default_handler(Arc::new(LoggingEventHandler));

        Self {
            config: Arc::new(config),
            handlers: Arc::new(handlers),
        }
    }
}

/// Main application
pub struct App {
    state: AppState,
}

impl App {
    pub fn build(config: AppConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config),
        })
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting server");
        info!("HTTP address: {}", self.state.config.server.address());
        info!("Webhook path: {}", self.state.config.channel.webhook_path);

        Server::new(self.state).run().await
    }
}
