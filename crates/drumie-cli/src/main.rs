//! # Drumie
//!
//! Command-line client for Drumie pub/sub servers.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! drumie
//!
//! # Run with custom config
//! drumie --config /path/to/drumie.toml
//!
//! # Subscribe two channels and publish to one of them every second
//! drumie --channel customer --channel nice --publish-to customer --interval-ms 1000
//!
//! # Override settings with environment variables
//! DRUMIE_ENDPOINT=wss://rt.example.com/connect DRUMIE_AUTH__CLIENT_ID=jane drumie
//! ```

mod auth;
mod config;
mod metrics;
mod run;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Drumie pub/sub client
#[derive(Parser, Debug)]
#[command(name = "drumie", version)]
#[command(about = "Subscribe to Drumie channels and publish to them periodically")]
struct Args {
    /// Configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Server WebSocket endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Channel to subscribe; repeat for several
    #[arg(long = "channel", value_name = "NAME")]
    channels: Vec<String>,

    /// Channel to publish to
    #[arg(long, value_name = "NAME")]
    publish_to: Option<String>,

    /// Interval between published messages
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Serve Prometheus metrics on this port
    #[arg(long, value_name = "PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(self, config: &mut config::Config) {
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if !self.channels.is_empty() {
            config.channels = self.channels;
        }
        if let Some(channel) = self.publish_to {
            config.publish.channel = Some(channel);
        }
        if let Some(interval_ms) = self.interval_ms {
            config.publish.interval_ms = interval_ms;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.enabled = true;
            config.metrics.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drumie=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = config::Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    tracing::info!(
        endpoint = %config.endpoint,
        channels = ?config.channels,
        "Starting Drumie client"
    );

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
    }

    run::run(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = Args::try_parse_from([
            "drumie",
            "--endpoint",
            "ws://127.0.0.1:9000/connect",
            "--channel",
            "orders",
            "--channel",
            "nice",
            "--publish-to",
            "orders",
            "--interval-ms",
            "500",
        ])
        .unwrap();

        let mut config = config::Config::default();
        args.apply(&mut config);
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/connect");
        assert_eq!(config.channels, vec!["orders", "nice"]);
        assert_eq!(config.publish.channel.as_deref(), Some("orders"));
        assert_eq!(config.publish.interval_ms, 500);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_args_keeps_config() {
        let args = Args::try_parse_from(["drumie"]).unwrap();
        let mut config = config::Config::default();
        args.apply(&mut config);
        assert_eq!(config.channels, vec!["customer", "nice"]);
        assert_eq!(config.publish.channel.as_deref(), Some("customer"));
    }
}
