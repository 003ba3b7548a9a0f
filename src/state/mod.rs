//! Application state shared by every handler, including the registry of live
//! match sessions.

pub mod ball_count;
pub mod clock;
pub mod match_state;
pub mod penalty;
pub mod reducer;
pub mod sections;
pub mod session;
pub mod shared_store;
mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use tracing::debug;

use crate::{
    config::AppConfig,
    dao::document_store::DocumentStore,
    error::ServiceError,
    state::{match_state::MatchKey, session::MatchSession, shared_store::SharedStore},
};

pub use self::sse::{ControllerChannel, MatchChannels, SseHub};

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, match sessions and the shared store.
pub struct AppState {
    document_store: RwLock<Option<Arc<dyn DocumentStore>>>,
    degraded: watch::Sender<bool>,
    sessions: DashMap<MatchKey, Arc<MatchSession>>,
    shared: SharedStore,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            document_store: RwLock::new(None),
            degraded: degraded_tx,
            sessions: DashMap::new(),
            shared: SharedStore::new(config.channel_capacity),
            config,
        })
    }

    /// Configuration the server was started with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current document store, if one is installed.
    pub async fn document_store(&self) -> Option<Arc<dyn DocumentStore>> {
        let guard = self.document_store.read().await;
        guard.as_ref().cloned()
    }

    /// Document store or [`ServiceError::Degraded`].
    pub async fn require_document_store(&self) -> Result<Arc<dyn DocumentStore>, ServiceError> {
        self.document_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new document store implementation and leave degraded mode.
    pub async fn set_document_store(&self, store: Arc<dyn DocumentStore>) {
        {
            let mut guard = self.document_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current document store and enter degraded mode.
    pub async fn clear_document_store(&self) {
        {
            let mut guard = self.document_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Local shared store every snapshot is mirrored into.
    pub fn shared(&self) -> &SharedStore {
        &self.shared
    }

    /// Session for `key`, created on first use.
    pub fn session(&self, key: &MatchKey) -> Arc<MatchSession> {
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(MatchSession::new(key.clone(), self.config.channel_capacity))
            })
            .clone()
    }

    /// Existing session for `key`. Never creates one.
    pub fn find_session(&self, key: &MatchKey) -> Option<Arc<MatchSession>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Session for `key` with one more stream counted on it. Every call must be
    /// paired with [`AppState::detach_session`] when the stream closes.
    pub fn attach_session(&self, key: &MatchKey) -> Arc<MatchSession> {
        let entry = self.sessions.entry(key.clone()).or_insert_with(|| {
            Arc::new(MatchSession::new(key.clone(), self.config.channel_capacity))
        });
        // Counted under the shard lock so eviction cannot interleave.
        entry.attach();
        entry.value().clone()
    }

    /// Release one stream of `session` and evict it once no stream remains.
    /// Returns whether the session was evicted.
    pub fn detach_session(&self, session: &Arc<MatchSession>) -> bool {
        if session.detach() > 0 {
            return false;
        }
        let evicted = self
            .sessions
            .remove_if(session.key(), |_, current| {
                Arc::ptr_eq(current, session) && current.attached_streams() == 0
            })
            .is_some();
        if evicted {
            debug!(key = %session.key(), "idle match session evicted");
        }
        evicted
    }

    /// Every live session.
    pub fn sessions(&self) -> Vec<Arc<MatchSession>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
