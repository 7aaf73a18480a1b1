//! Command-line argument parsing

use clap::Parser;
use std::path::PathBuf;

/// Flags override values from the configuration file and `LINE_BOT__*`
/// environment variables.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "linebot-server",
    about = "LINE Messaging API webhook receiver",
    version,
    long_about = "Receives webhook callbacks for a LINE channel, verifies their \
                  signature and logs the decoded events."
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "LINE_BOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path the webhook endpoint is served at
    #[arg(long)]
    pub webhook_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: Option<String>,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let args = Args::parse_from([
            "linebot-server",
            "--port",
            "3000",
            "--log-level",
            "debug",
            "--webhook-path",
            "/line",
            "--json-logs",
        ]);

        assert_eq!(args.port, Some(3000));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.webhook_path.as_deref(), Some("/line"));
        assert!(args.json_logs);
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let result = Args::try_parse_from(["linebot-server", "--log-level", "loud"]);
        assert!(result.is_err());
    }
}
