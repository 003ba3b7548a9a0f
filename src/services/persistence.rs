//! Fire-and-forget persistence of match documents.
//!
//! Each match owns a [`PendingWrites`] slot per document partition. Enqueuing
//! replaces whatever was waiting, so a burst of mutations produces one write per
//! partition carrying the newest document. Failed writes are logged and dropped.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{
    dao::{
        document_store::DocumentName,
        models::{GameDocument, SettingsDocument},
    },
    state::{
        SharedState,
        match_state::{MatchKey, MatchState},
    },
};

#[derive(Default)]
struct Slots {
    settings: Option<Value>,
    game: Option<Value>,
}

/// Newest unsaved document per partition, plus a wake-up for the writer task.
#[derive(Default)]
pub struct PendingWrites {
    slots: Mutex<Slots>,
    notify: Notify,
    closed: AtomicBool,
}

impl PendingWrites {
    /// Replace the pending document of `name`.
    pub fn enqueue(&self, name: DocumentName, document: Value) {
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match name {
                DocumentName::Settings => slots.settings = Some(document),
                DocumentName::Game => slots.game = Some(document),
            }
        }
        self.notify.notify_one();
    }

    /// Queue the partitions of `state` that changed.
    pub fn enqueue_state(&self, state: &MatchState, settings: bool, progress: bool) {
        if settings {
            match serde_json::to_value(SettingsDocument::from_state(state)) {
                Ok(document) => self.enqueue(DocumentName::Settings, document),
                Err(err) => {
                    warn!(key = %state.key, error = %err, "failed to encode settings document")
                }
            }
        }
        if progress {
            match serde_json::to_value(GameDocument::from_state(state)) {
                Ok(document) => self.enqueue(DocumentName::Game, document),
                Err(err) => warn!(key = %state.key, error = %err, "failed to encode game document"),
            }
        }
    }

    /// Take everything waiting, settings first.
    pub fn drain(&self) -> Vec<(DocumentName, Value)> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let settings = slots.settings.take().map(|doc| (DocumentName::Settings, doc));
        let game = slots.game.take().map(|doc| (DocumentName::Game, doc));
        settings.into_iter().chain(game).collect()
    }

    /// Wait for the next enqueue or for [`PendingWrites::close`].
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// No further documents will arrive; wake the writer one last time.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Whether the owning session is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Writer loop of one match. Ends after the final flush once the session is dropped.
pub async fn run_writer(state: SharedState, key: MatchKey, writes: Arc<PendingWrites>) {
    loop {
        writes.notified().await;
        flush(&state, &key, &writes).await;
        if writes.is_closed() {
            debug!(%key, "session closed; document writer stopped");
            break;
        }
    }
}

/// Write every pending document once.
pub async fn flush(state: &SharedState, key: &MatchKey, writes: &PendingWrites) {
    let pending = writes.drain();
    if pending.is_empty() {
        return;
    }
    let Some(store) = state.document_store().await else {
        debug!(%key, "degraded mode; dropping {} pending document(s)", pending.len());
        return;
    };
    for (name, document) in pending {
        match store.save(key, name, document).await {
            Ok(()) => debug!(%key, document = %name, "document persisted"),
            Err(err) => warn!(%key, document = %name, error = %err, "failed to persist document"),
        }
    }
}
