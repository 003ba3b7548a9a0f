//! Local shared store: the latest serialized snapshot of every match, plus change
//! notifications for subscribers.
//!
//! Snapshots are kept as JSON text, exactly as viewers receive them, so a reader
//! always goes through the same parse step and a damaged entry is detected instead
//! of being trusted.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::state::match_state::{MatchKey, MatchState};

/// Failure to read a snapshot back from the shared store.
#[derive(Debug, Error)]
#[error("corrupt shared snapshot for `{key}`")]
pub struct SnapshotError {
    pub key: MatchKey,
    #[source]
    pub source: serde_json::Error,
}

/// Notification sent after a snapshot was replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotChanged {
    pub key: MatchKey,
    pub version: u64,
}

/// Versioned JSON snapshots keyed by match.
pub struct SharedStore {
    entries: DashMap<MatchKey, Arc<str>>,
    changes: broadcast::Sender<SnapshotChanged>,
}

impl SharedStore {
    pub fn new(capacity: usize) -> Self {
        let (changes, _receiver) = broadcast::channel(capacity);
        Self {
            entries: DashMap::new(),
            changes,
        }
    }

    /// Replace the snapshot of `state.key` and notify subscribers.
    pub fn publish(&self, state: &MatchState) -> serde_json::Result<()> {
        let json = serde_json::to_string(state)?;
        self.entries.insert(state.key.clone(), Arc::from(json));
        let _ = self.changes.send(SnapshotChanged {
            key: state.key.clone(),
            version: state.version,
        });
        Ok(())
    }

    /// Store raw text for `key` without validating it.
    pub fn publish_raw(&self, key: &MatchKey, json: impl Into<Arc<str>>) {
        self.entries.insert(key.clone(), json.into());
        let _ = self.changes.send(SnapshotChanged {
            key: key.clone(),
            version: 0,
        });
    }

    /// Latest snapshot for `key`, `None` when nothing was published yet.
    pub fn read(&self, key: &MatchKey) -> Option<Result<MatchState, SnapshotError>> {
        let json = self.entries.get(key).map(|entry| entry.value().clone())?;
        Some(
            serde_json::from_str(&json).map_err(|source| SnapshotError {
                key: key.clone(),
                source,
            }),
        )
    }

    /// Raw JSON for `key`.
    pub fn read_raw(&self, key: &MatchKey) -> Option<Arc<str>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Drop a damaged entry so the next reader falls back to remote storage.
    pub fn discard(&self, key: &MatchKey) {
        self.entries.remove(key);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotChanged> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::match_state::MatchSettings;

    fn key() -> MatchKey {
        MatchKey::new("spring-cup", "3")
    }

    #[test]
    fn publish_then_read_returns_same_state() {
        let store = SharedStore::new(4);
        let mut state = MatchState::new(key(), MatchSettings::default());
        state.version = 7;

        store.publish(&state).unwrap();
        let read = store.read(&key()).unwrap().unwrap();
        assert_eq!(read, state);
    }

    #[test]
    fn corrupt_entry_surfaces_parse_error() {
        let store = SharedStore::new(4);
        store.publish_raw(&key(), "{\"key\":");

        assert!(store.read(&key()).unwrap().is_err());
        store.discard(&key());
        assert!(store.read(&key()).is_none());
    }

    #[tokio::test]
    async fn subscribers_are_notified_with_version() {
        let store = SharedStore::new(4);
        let mut receiver = store.subscribe();
        let mut state = MatchState::new(key(), MatchSettings::default());
        state.version = 3;

        store.publish(&state).unwrap();
        let change = receiver.recv().await.unwrap();
        assert_eq!(
            change,
            SnapshotChanged {
                key: key(),
                version: 3
            }
        );
    }
}
