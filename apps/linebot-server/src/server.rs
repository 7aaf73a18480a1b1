//! HTTP Server implementation

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use linebot_webhook::{create_webhook_router, WebhookReceiverState};

use crate::app::AppState;

pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.server.address();
        let app = self.build_http_router();

        let listener = tokio::net::TcpListener::bind(addr.as_str())
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        Ok(())
    }

    fn build_http_router(&self) -> Router {
        let channel = &self.state.config.channel;
        let receiver = WebhookReceiverState::new(
            channel.secret.clone(),
            Arc::clone(&self.state.handlers),
        );

        Router::new()
            .route("/", get(root))
            .route("/health", get(health_check))
            .merge(create_webhook_router(
                Arc::new(receiver),
                &channel.webhook_path,
            ))
            .layer(TraceLayer::new_for_http())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

// Route handlers

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "LINE webhook server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
