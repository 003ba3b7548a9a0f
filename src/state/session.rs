//! Per-match server context and the display language.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, watch};
use utoipa::ToSchema;

use crate::{
    services::persistence::PendingWrites,
    state::{
        match_state::{MatchKey, MatchState},
        sse::MatchChannels,
    },
};

/// Display language shared by every screen of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    #[default]
    En,
    /// Japanese.
    Ja,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::En => f.write_str("en"),
            Language::Ja => f.write_str("ja"),
        }
    }
}

/// Server-side context of one match: the authoritative state once a controller
/// opened it, the SSE channels, the display language and pending remote writes.
pub struct MatchSession {
    key: MatchKey,
    /// Every mutation takes this lock, so it doubles as the FIFO mutation queue.
    state: Mutex<Option<MatchState>>,
    channels: MatchChannels,
    language: watch::Sender<Language>,
    writes: Arc<PendingWrites>,
    workers_started: AtomicBool,
    attached: AtomicUsize,
}

impl MatchSession {
    /// Empty session; the match is loaded by the first controller open.
    pub fn new(key: MatchKey, channel_capacity: usize) -> Self {
        let (language, _rx) = watch::channel(Language::default());
        Self {
            key,
            state: Mutex::new(None),
            channels: MatchChannels::new(channel_capacity),
            language,
            writes: Arc::new(PendingWrites::default()),
            workers_started: AtomicBool::new(false),
            attached: AtomicUsize::new(0),
        }
    }

    /// Key of the match this session serves.
    pub fn key(&self) -> &MatchKey {
        &self.key
    }

    /// Viewer and controller channels.
    pub fn channels(&self) -> &MatchChannels {
        &self.channels
    }

    /// Acquire the match state for a mutation. Callers queue in arrival order.
    pub async fn lock(&self) -> MutexGuard<'_, Option<MatchState>> {
        self.state.lock().await
    }

    /// Copy of the authoritative state, if the match was opened.
    pub async fn snapshot(&self) -> Option<MatchState> {
        self.state.lock().await.clone()
    }

    /// Current display language.
    pub fn language(&self) -> Language {
        *self.language.borrow()
    }

    /// Subscribe to language switches.
    pub fn language_watcher(&self) -> watch::Receiver<Language> {
        self.language.subscribe()
    }

    /// Switch the display language; returns `false` when it was already set.
    pub fn set_language(&self, language: Language) -> bool {
        self.language.send_if_modified(|current| {
            if *current == language {
                false
            } else {
                *current = language;
                true
            }
        })
    }

    /// Documents waiting for the background writer.
    pub fn writes(&self) -> &Arc<PendingWrites> {
        &self.writes
    }

    /// Count one more open stream.
    pub(crate) fn attach(&self) {
        self.attached.fetch_add(1, Ordering::AcqRel);
    }

    /// Count one stream gone; returns how many remain.
    pub(crate) fn detach(&self) -> usize {
        let previous = self
            .attached
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Number of streams currently open on this session.
    pub fn attached_streams(&self) -> usize {
        self.attached.load(Ordering::Acquire)
    }

    /// Claim the right to spawn the match's background workers. Only the first
    /// caller gets `true`.
    pub fn claim_workers(&self) -> bool {
        !self.workers_started.swap(true, Ordering::AcqRel)
    }
}

impl Drop for MatchSession {
    fn drop(&mut self) {
        // Lets the writer flush what is left and exit.
        self.writes.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_changes_are_reported_once() {
        let session = MatchSession::new(MatchKey::new("ev", "1"), 4);
        let watcher = session.language_watcher();

        assert!(session.set_language(Language::Ja));
        assert!(!session.set_language(Language::Ja));
        assert_eq!(*watcher.borrow(), Language::Ja);
        assert_eq!(session.language().to_string(), "ja");
    }

    #[test]
    fn workers_are_claimed_once() {
        let session = MatchSession::new(MatchKey::new("ev", "1"), 4);
        assert!(session.claim_workers());
        assert!(!session.claim_workers());
    }

    #[test]
    fn dropping_the_session_closes_its_write_queue() {
        let session = MatchSession::new(MatchKey::new("ev", "1"), 4);
        let writes = session.writes().clone();
        assert!(!writes.is_closed());
        drop(session);
        assert!(writes.is_closed());
    }

    #[test]
    fn stream_count_never_underflows() {
        let session = MatchSession::new(MatchKey::new("ev", "1"), 4);
        session.attach();
        session.attach();
        assert_eq!(session.detach(), 1);
        assert_eq!(session.detach(), 0);
        assert_eq!(session.detach(), 0);
        assert_eq!(session.attached_streams(), 0);
    }
}
