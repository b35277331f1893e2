//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// What happens to a channel's presence members across a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresencePolicy {
    /// Forget members when the connection drops.
    #[default]
    Clean,
    /// Keep members and re-announce them through `join` after resubscribing.
    Replay,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client name sent in the connect frame.
    #[serde(default)]
    pub name: Option<String>,

    /// Time allowed for the server to acknowledge the connect frame.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Maximum encoded size of an outbound frame in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Reconnect backoff.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Presence handling across reconnects.
    #[serde(default)]
    pub presence: PresencePolicy,
}

fn default_handshake_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: None,
            handshake_timeout_ms: default_handshake_timeout(),
            max_message_size: default_max_message_size(),
            reconnect: ReconnectPolicy::default(),
            presence: PresencePolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_message_size, 64 * 1024);
        assert_eq!(config.presence, PresencePolicy::Clean);
        assert!(config.reconnect.enabled);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            name = "John Doe"
            presence = "replay"

            [reconnect]
            max_attempts = 3
            initial_delay_ms = 250
        "#;

        let config: SessionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.name.as_deref(), Some("John Doe"));
        assert_eq!(config.presence, PresencePolicy::Replay);
        assert_eq!(config.reconnect.max_attempts, Some(3));
        assert_eq!(config.reconnect.initial_delay_ms, 250);
        assert_eq!(config.reconnect.max_delay_ms, 20_000);
        assert_eq!(config.handshake_timeout_ms, 10_000);
    }
}
