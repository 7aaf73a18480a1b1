use crate::secret::ChannelSecret;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::Path;

/// Environment prefix used when none is given, e.g. `LINE_BOT__CHANNEL__SECRET`.
pub const DEFAULT_ENV_PREFIX: &str = "LINE_BOT";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub channel: ChannelConfig,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env(DEFAULT_ENV_PREFIX)
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(Environment::with_prefix(prefix).separator("__"))
            .build()?;
        config.try_deserialize()
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_from_file_with_prefix(path, DEFAULT_ENV_PREFIX)
    }

    pub fn load_from_file_with_prefix(
        path: impl AsRef<Path>,
        prefix: &str,
    ) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(prefix).separator("__"))
            .build()?;
        config.try_deserialize()
    }

    // Values are kept as strings where possible; channel secrets are hex and
    // must never be coerced into numbers.
    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("channel.secret", "")?
            .set_default("channel.webhook_path", default_webhook_path())?
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .set_default("telemetry.log_level", default_log_level())?
            .set_default("telemetry.json_logs", false)
    }
}

/// Messaging channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub secret: ChannelSecret,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl ChannelConfig {
    pub fn new(secret: impl Into<ChannelSecret>) -> Self {
        Self {
            secret: secret.into(),
            webhook_path: default_webhook_path(),
        }
    }

    pub fn with_webhook_path(mut self, path: &str) -> Self {
        self.webhook_path = path.to_string();
        self
    }
}

fn default_webhook_path() -> String {
    "/callback".to_string()
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
