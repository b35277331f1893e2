//! Client configuration.
//!
//! Configuration is layered, later sources winning:
//! - TOML configuration file (`--config`, or the first default path found)
//! - Environment variables (`DRUMIE_*`, `__` separating nested keys)
//! - Command line arguments

use anyhow::{bail, Context, Result};
use drumie_core::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths searched when no `--config` is given.
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "drumie.toml",
    "/etc/drumie/drumie.toml",
    "~/.config/drumie/drumie.toml",
];

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server WebSocket endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Channels to subscribe.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    /// Token issuer.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Periodic publishing.
    #[serde(default)]
    pub publish: PublishConfig,

    /// Session behaviour.
    #[serde(default)]
    pub session: SessionConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// HTTP token issuer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// URL that issues connection tokens.
    #[serde(default = "default_connect_url")]
    pub connect_url: String,

    /// URL that issues subscription tokens.
    #[serde(default = "default_subscribe_url")]
    pub subscribe_url: String,

    /// Client identifier sent with connect token requests.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Display name sent with connect token requests.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Channel filter sent with connect token requests: `*` or
    /// space-separated channel names.
    #[serde(default = "default_channel_filter")]
    pub channels: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_auth_timeout")]
    pub timeout_ms: u64,
}

/// Periodic publishing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Channel to publish to; publishing is off when unset.
    #[serde(default = "default_publish_channel")]
    pub channel: Option<String>,

    /// Interval between messages in milliseconds.
    #[serde(default = "default_publish_interval")]
    pub interval_ms: u64,

    /// Message text; a running counter is appended.
    #[serde(default = "default_publish_prefix")]
    pub prefix: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_endpoint() -> String {
    "ws://localhost:8000/connect".to_string()
}

fn default_channels() -> Vec<String> {
    vec!["customer".to_string(), "nice".to_string()]
}

fn default_connect_url() -> String {
    "http://localhost:8000/api/connect-token".to_string()
}

fn default_subscribe_url() -> String {
    "http://localhost:8000/api/subscribe-token".to_string()
}

fn default_client_id() -> String {
    "john".to_string()
}

fn default_client_name() -> String {
    "John Doe".to_string()
}

fn default_channel_filter() -> String {
    "*".to_string()
}

fn default_auth_timeout() -> u64 {
    5_000 // 5 seconds
}

fn default_publish_channel() -> Option<String> {
    Some("customer".to_string())
}

fn default_publish_interval() -> u64 {
    2_000 // 2 seconds
}

fn default_publish_prefix() -> String {
    "auto publish".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            channels: default_channels(),
            auth: AuthConfig::default(),
            publish: PublishConfig::default(),
            session: SessionConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            connect_url: default_connect_url(),
            subscribe_url: default_subscribe_url(),
            client_id: default_client_id(),
            client_name: default_client_name(),
            channels: default_channel_filter(),
            timeout_ms: default_auth_timeout(),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            channel: default_publish_channel(),
            interval_ms: default_publish_interval(),
            prefix: default_publish_prefix(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the first default path that
    /// exists, then apply environment overrides. The result is not yet
    /// validated.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is missing, or if a file or variable
    /// cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => find_default_file(),
        };
        if let Some(file) = &file {
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("DRUMIE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("channels"),
            )
            .build()
            .and_then(config::Config::try_deserialize::<Config>)
            .with_context(|| match &file {
                Some(file) => format!("Failed to load config file: {}", file.display()),
                None => "Failed to load configuration".to_string(),
            })?;

        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            bail!("At least one channel must be configured");
        }
        if let Some(channel) = &self.publish.channel {
            if !self.channels.contains(channel) {
                bail!("Publish channel {channel:?} is not in the channel list");
            }
        }
        if self.publish.interval_ms == 0 {
            bail!("Publish interval must be greater than zero");
        }
        Ok(())
    }
}

fn find_default_file() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).into_owned()))
        .find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drumie_core::PresencePolicy;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, "ws://localhost:8000/connect");
        assert_eq!(config.auth.connect_url, "http://localhost:8000/api/connect-token");
        assert_eq!(config.auth.subscribe_url, "http://localhost:8000/api/subscribe-token");
        assert_eq!(config.auth.channels, "*");
        assert_eq!(config.channels, vec!["customer", "nice"]);
        assert_eq!(config.publish.channel.as_deref(), Some("customer"));
        assert_eq!(config.publish.interval_ms, 2_000);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            endpoint = "wss://rt.example.com/connect"
            channels = ["orders"]

            [publish]
            channel = "orders"
            prefix = "tick"

            [session]
            presence = "replay"

            [session.reconnect]
            max_attempts = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.endpoint, "wss://rt.example.com/connect");
        assert_eq!(config.publish.prefix, "tick");
        assert_eq!(config.publish.interval_ms, 2_000);
        assert_eq!(config.session.presence, PresencePolicy::Replay);
        assert_eq!(config.session.reconnect.max_attempts, Some(3));
        assert_eq!(config.auth.client_name, "John Doe");
        assert_eq!(config.auth.channels, "*");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_publish_channel() {
        let config = Config {
            channels: vec!["nice".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            publish: PublishConfig {
                channel: None,
                ..PublishConfig::default()
            },
            channels: vec!["nice".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("drumie-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
                endpoint = "ws://127.0.0.1:9000/connect"

                [auth]
                client_id = "jane"
                channels = "customer nice"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/connect");
        assert_eq!(config.auth.client_id, "jane");
        assert_eq!(config.auth.channels, "customer nice");
        assert_eq!(config.channels, vec!["customer", "nice"]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = Path::new("/nonexistent/drumie.toml");
        assert!(Config::load(Some(path)).is_err());
    }
}
