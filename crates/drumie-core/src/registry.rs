//! Channel registry.
//!
//! The registry is the read side of the channel set: handles and lookups
//! go through it without a round trip to the session driver, while the
//! driver is the only writer.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::debug;

use crate::channel::ChannelState;
use crate::error::ClientError;

/// Registry entry for one channel.
#[derive(Debug, Clone)]
pub(crate) struct ChannelSlot {
    /// Registration id; increases with every insert.
    pub(crate) id: u64,
    /// Channel state as published by the driver.
    pub(crate) state: watch::Receiver<ChannelState>,
}

/// Name-indexed channel registry.
#[derive(Debug, Default)]
pub(crate) struct ChannelRegistry {
    slots: DashMap<String, ChannelSlot>,
    next_id: AtomicU64,
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `name`, returning its new id.
    pub(crate) fn insert(
        &self,
        name: &str,
        state: watch::Receiver<ChannelState>,
    ) -> Result<u64, ClientError> {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ClientError::DuplicateChannel(name.to_string())),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                entry.insert(ChannelSlot { id, state });
                debug!(channel = %name, id, "Channel registered");
                Ok(id)
            }
        }
    }

    /// Remove `name` if it is still registered under `id`.
    pub(crate) fn remove(&self, name: &str, id: u64) -> bool {
        let removed = self.slots.remove_if(name, |_, slot| slot.id == id).is_some();
        if removed {
            debug!(channel = %name, id, "Channel removed");
        }
        removed
    }

    pub(crate) fn get(&self, name: &str) -> Option<ChannelSlot> {
        self.slots.get(name).map(|slot| slot.value().clone())
    }

    /// Channel names in registration order.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut entries: Vec<(u64, String)> = self
            .slots
            .iter()
            .map(|entry| (entry.value().id, entry.key().clone()))
            .collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> watch::Receiver<ChannelState> {
        watch::channel(ChannelState::Unsubscribed).1
    }

    #[test]
    fn test_insert_and_get() {
        let registry = ChannelRegistry::new();
        let id = registry.insert("customer", state()).unwrap();

        let slot = registry.get("customer").unwrap();
        assert_eq!(slot.id, id);
        assert_eq!(*slot.state.borrow(), ChannelState::Unsubscribed);
        assert!(registry.get("nice").is_none());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let registry = ChannelRegistry::new();
        registry.insert("customer", state()).unwrap();

        assert_eq!(
            registry.insert("customer", state()),
            Err(ClientError::DuplicateChannel("customer".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_keep_insertion_order() {
        let registry = ChannelRegistry::new();
        for name in ["nice", "customer", "alerts", "billing"] {
            registry.insert(name, state()).unwrap();
        }
        assert_eq!(registry.names(), vec!["nice", "customer", "alerts", "billing"]);
    }

    #[test]
    fn test_remove_checks_id() {
        let registry = ChannelRegistry::new();
        let old = registry.insert("customer", state()).unwrap();
        assert!(registry.remove("customer", old));

        let new = registry.insert("customer", state()).unwrap();
        assert_ne!(old, new);
        assert!(!registry.remove("customer", old));
        assert!(registry.remove("customer", new));
        assert!(registry.is_empty());
    }
}
