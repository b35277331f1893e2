//! Presence tracking for Drumie channels.
//!
//! Each channel keeps the members it has learned about from join and leave
//! frames since it was subscribed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Presence state for a single member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    /// Client identifier reported by the server.
    pub client: String,
    /// Member metadata.
    pub data: Option<serde_json::Value>,
    /// When the join was observed (milliseconds since the Unix epoch).
    pub joined_at: u64,
}

impl PresenceState {
    /// Create a new presence state.
    #[must_use]
    pub fn new(client: impl Into<String>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            client: client.into(),
            data: None,
            joined_at: now,
        }
    }

    /// Create a presence state with metadata.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Presence tracker for a channel.
#[derive(Debug, Default)]
pub struct Presence {
    members: HashMap<String, PresenceState>,
}

impl Presence {
    /// Create a new presence tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of present members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Check if a client is present.
    #[must_use]
    pub fn is_present(&self, client: &str) -> bool {
        self.members.contains_key(client)
    }

    /// Get the presence state for a client.
    #[must_use]
    pub fn get(&self, client: &str) -> Option<&PresenceState> {
        self.members.get(client)
    }

    /// Record a join.
    ///
    /// Returns `true` if this is a new member, `false` if updating existing.
    /// A repeated join keeps the original `joined_at`.
    pub fn join(&mut self, client: impl Into<String>, data: Option<serde_json::Value>) -> bool {
        let client = client.into();
        match self.members.get_mut(&client) {
            Some(state) => {
                state.data = data;
                false
            }
            None => {
                let mut state = PresenceState::new(client.clone());
                state.data = data;
                debug!(client = %client, "Presence: member joined");
                self.members.insert(client, state);
                true
            }
        }
    }

    /// Record a leave.
    ///
    /// Returns the removed presence state, if any.
    pub fn leave(&mut self, client: &str) -> Option<PresenceState> {
        let state = self.members.remove(client);
        if state.is_some() {
            debug!(client = %client, "Presence: member left");
        }
        state
    }

    /// Forget every member.
    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Members ordered by join time.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceState> {
        let mut members: Vec<PresenceState> = self.members.values().cloned().collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.client.cmp(&b.client))
        });
        members
    }

    /// Check if presence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_presence_state() {
        let state = PresenceState::new("user-2").with_data(json!({"name": "Jane"}));

        assert_eq!(state.client, "user-2");
        assert!(state.data.is_some());
        assert!(state.joined_at > 0);
    }

    #[test]
    fn test_presence_join_leave() {
        let mut presence = Presence::new();

        assert!(presence.join("user-2", None));
        assert!(!presence.join("user-2", Some(json!({"status": "away"})))); // Already present

        assert_eq!(presence.count(), 1);
        assert_eq!(presence.get("user-2").unwrap().data, Some(json!({"status": "away"})));

        assert!(presence.leave("user-2").is_some());
        assert!(presence.leave("user-2").is_none());
        assert!(!presence.is_present("user-2"));
    }

    #[test]
    fn test_presence_snapshot_and_clear() {
        let mut presence = Presence::new();
        presence.join("user-2", Some(json!({"name": "Jane"})));
        presence.join("user-3", Some(json!({"name": "Bob"})));

        let snapshot = presence.snapshot();
        assert_eq!(snapshot.len(), 2);

        presence.clear();
        assert!(presence.is_empty());
    }
}
