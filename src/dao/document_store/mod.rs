#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod format;
pub mod fs;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::fmt;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::{dao::storage::StorageResult, state::match_state::MatchKey};

/// Per-match document partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentName {
    /// Names, classification, rules, clock limits and sections.
    Settings,
    /// Scores, clocks, section, penalties, approvals and shot log.
    Game,
}

impl DocumentName {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentName::Settings => "settings",
            DocumentName::Game => "game",
        }
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only documents shared by every court of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventDocument {
    /// Tournament initialization defaults and court line-ups.
    Init,
    /// Classification lookup table.
    Classifications,
}

impl EventDocument {
    pub fn as_str(self) -> &'static str {
        match self {
            EventDocument::Init => "init",
            EventDocument::Classifications => "classifications",
        }
    }
}

impl fmt::Display for EventDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote JSON document storage addressed by `(eventId, courtId, documentName)`.
///
/// `load` answers `Ok(None)` for a missing document and
/// [`StorageError::Malformed`](crate::dao::storage::StorageError::Malformed) when the
/// stored bytes are not JSON. `save` overwrites the document wholesale.
pub trait DocumentStore: Send + Sync {
    fn load(
        &self,
        key: &MatchKey,
        name: DocumentName,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    fn save(
        &self,
        key: &MatchKey,
        name: DocumentName,
        document: Value,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn load_event_document(
        &self,
        event_id: &str,
        document: EventDocument,
    ) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
