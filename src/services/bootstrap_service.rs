//! Loading a match from remote storage.
//!
//! Missing or unreadable documents are synthesized from the event's `init` and
//! `classifications` documents (or the configured defaults), an inconsistent section
//! schedule is rebuilt from the match shape, and the controller writes whatever it
//! had to repair back once.

use std::{sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    dao::{
        document_store::{DocumentName, DocumentStore, EventDocument},
        models::{ClassificationTable, GameDocument, SettingsDocument, TournamentInit},
        storage::StorageError,
    },
    error::ServiceError,
    state::{
        match_state::{MatchKey, MatchSettings, MatchState},
        sections::{relocate, schedule_is_consistent},
    },
};

const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a loaded document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Stored,
    /// Built locally because the stored copy was missing or unreadable.
    Synthesized,
}

/// A match reconstructed from storage.
#[derive(Debug, Clone)]
pub struct LoadedMatch {
    pub state: MatchState,
    pub settings: Origin,
    pub game: Origin,
    /// The stored schedule did not fit the match shape and was rebuilt.
    pub healed_schedule: bool,
}

impl LoadedMatch {
    fn needs_settings_write(&self) -> bool {
        self.settings == Origin::Synthesized || self.healed_schedule
    }

    fn needs_game_write(&self) -> bool {
        self.game == Origin::Synthesized || self.healed_schedule
    }
}

/// Load and repair the match at `key`.
///
/// Without a store the match is built from `defaults`. Only an unreachable backend
/// fails the load; absent or corrupt documents are replaced.
pub async fn load_match(
    store: Option<&Arc<dyn DocumentStore>>,
    key: &MatchKey,
    defaults: &MatchSettings,
    now_ms: i64,
) -> Result<LoadedMatch, ServiceError> {
    let Some(store) = store else {
        return Ok(synthesize_all(key, defaults.clone()));
    };

    let stored_settings = fetch::<SettingsDocument>(store, key, DocumentName::Settings).await?;
    // (version, last_updated_ms) of the settings partition
    let (mut settings, settings_origin, stamp) = match stored_settings {
        Some(doc) => (doc.settings, Origin::Stored, (doc.version, doc.last_updated_ms)),
        None => (
            synthesize_settings(store, key, defaults).await?,
            Origin::Synthesized,
            (0, 0),
        ),
    };

    let previous = settings.sections.clone();
    let healed_schedule = !schedule_is_consistent(&settings);
    if healed_schedule {
        warn!(%key, "stored section schedule is inconsistent; rebuilding it");
        settings.regenerate_sections();
    }

    let stored_game = fetch::<GameDocument>(store, key, DocumentName::Game).await?;
    let loaded = match stored_game {
        Some(doc) => {
            let mut state = MatchState {
                key: key.clone(),
                settings,
                progress: doc.progress,
                version: doc.version.max(stamp.0),
                last_updated_ms: doc.last_updated_ms.max(stamp.1),
            };
            relocate(&mut state, &previous, now_ms);
            LoadedMatch {
                state,
                settings: settings_origin,
                game: Origin::Stored,
                healed_schedule,
            }
        }
        None => {
            let mut state = MatchState::new(key.clone(), settings);
            state.version = stamp.0;
            state.last_updated_ms = stamp.1;
            LoadedMatch {
                state,
                settings: settings_origin,
                game: Origin::Synthesized,
                healed_schedule,
            }
        }
    };
    Ok(loaded)
}

/// Write the repaired documents of `loaded` back. Failures are logged only.
pub async fn write_back(store: &Arc<dyn DocumentStore>, loaded: &LoadedMatch) {
    let key = &loaded.state.key;
    let mut documents = Vec::new();
    if loaded.needs_settings_write() {
        documents.push((
            DocumentName::Settings,
            serde_json::to_value(SettingsDocument::from_state(&loaded.state)),
        ));
    }
    if loaded.needs_game_write() {
        documents.push((
            DocumentName::Game,
            serde_json::to_value(GameDocument::from_state(&loaded.state)),
        ));
    }

    for (name, encoded) in documents {
        let result = match encoded {
            Ok(document) => store.save(key, name, document).await,
            Err(err) => {
                warn!(%key, document = %name, error = %err, "failed to encode document");
                continue;
            }
        };
        match result {
            Ok(()) => info!(%key, document = %name, "wrote synthesized document"),
            Err(err) => {
                warn!(%key, document = %name, error = %err, "failed to write synthesized document")
            }
        }
    }
}

fn synthesize_all(key: &MatchKey, mut settings: MatchSettings) -> LoadedMatch {
    settings.regenerate_sections();
    LoadedMatch {
        state: MatchState::new(key.clone(), settings),
        settings: Origin::Synthesized,
        game: Origin::Synthesized,
        healed_schedule: false,
    }
}

async fn synthesize_settings(
    store: &Arc<dyn DocumentStore>,
    key: &MatchKey,
    defaults: &MatchSettings,
) -> Result<MatchSettings, ServiceError> {
    let init = fetch_event::<TournamentInit>(store, &key.event_id, EventDocument::Init).await?;
    let table = fetch_event::<ClassificationTable>(
        store,
        &key.event_id,
        EventDocument::Classifications,
    )
    .await?;

    let settings = match init {
        Some(init) => init.settings_for(&key.court_id, defaults, table.as_ref()),
        None => {
            let mut settings = defaults.clone();
            settings.apply_classification(table.as_ref());
            settings.regenerate_sections();
            settings
        }
    };
    info!(%key, "synthesized match settings");
    Ok(settings)
}

async fn fetch<T: DeserializeOwned>(
    store: &Arc<dyn DocumentStore>,
    key: &MatchKey,
    name: DocumentName,
) -> Result<Option<T>, ServiceError> {
    let raw = with_timeout(store.load(key, name)).await;
    decode(raw, || format!("{key}/{name}"))
}

async fn fetch_event<T: DeserializeOwned>(
    store: &Arc<dyn DocumentStore>,
    event_id: &str,
    document: EventDocument,
) -> Result<Option<T>, ServiceError> {
    let raw = with_timeout(store.load_event_document(event_id, document)).await;
    decode(raw, || format!("{event_id}/{document}"))
}

async fn with_timeout(
    load: futures::future::BoxFuture<'static, Result<Option<Value>, StorageError>>,
) -> Result<Result<Option<Value>, StorageError>, ServiceError> {
    timeout(LOAD_TIMEOUT, load)
        .await
        .map_err(|_| ServiceError::Timeout)
}

/// Missing, malformed and mistyped documents all decode to `None`.
fn decode<T: DeserializeOwned>(
    raw: Result<Result<Option<Value>, StorageError>, ServiceError>,
    describe: impl Fn() -> String,
) -> Result<Option<T>, ServiceError> {
    match raw? {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(document) => Ok(Some(document)),
            Err(err) => {
                warn!(
                    document = %describe(),
                    error = %err,
                    "stored document has an unexpected shape; ignoring it"
                );
                Ok(None)
            }
        },
        Ok(None) => Ok(None),
        Err(err) if err.is_malformed() => {
            warn!(document = %describe(), error = %err, "stored document is corrupt; ignoring it");
            Ok(None)
        }
        Err(err) => Err(ServiceError::Unavailable(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::document_store::memory::MemoryDocumentStore,
        state::sections::{SectionId, count_ends},
    };
    use serde_json::json;

    fn key() -> MatchKey {
        MatchKey::new("cup", "2")
    }

    fn store_handle(store: &MemoryDocumentStore) -> Arc<dyn DocumentStore> {
        Arc::new(store.clone())
    }

    #[tokio::test]
    async fn missing_documents_are_synthesized_from_init() {
        let store = MemoryDocumentStore::new();
        store.insert_event_document(
            "cup",
            EventDocument::Init,
            json!({"totalEnds": 2, "courts": {"2": {"redName": "Sendai"}}}),
        );
        let handle = store_handle(&store);

        let loaded = load_match(Some(&handle), &key(), &MatchSettings::default(), 0)
            .await
            .unwrap();
        assert_eq!(loaded.settings, Origin::Synthesized);
        assert_eq!(loaded.game, Origin::Synthesized);
        assert_eq!(loaded.state.settings.red_name, "Sendai");
        assert_eq!(count_ends(&loaded.state.settings.sections), 2);

        write_back(&handle, &loaded).await;
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn stored_documents_are_used_as_is() {
        let store = MemoryDocumentStore::new();
        let mut state = MatchState::new(key(), MatchSettings::default());
        state.progress.red.score = 4;
        state.version = 9;
        store.insert(
            &key(),
            DocumentName::Settings,
            serde_json::to_value(SettingsDocument::from_state(&state)).unwrap(),
        );
        store.insert(
            &key(),
            DocumentName::Game,
            serde_json::to_value(GameDocument::from_state(&state)).unwrap(),
        );
        let handle = store_handle(&store);

        let loaded = load_match(Some(&handle), &key(), &MatchSettings::default(), 0)
            .await
            .unwrap();
        assert_eq!(loaded.settings, Origin::Stored);
        assert_eq!(loaded.game, Origin::Stored);
        assert_eq!(loaded.state, state);

        write_back(&handle, &loaded).await;
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn inconsistent_schedule_is_rebuilt() {
        let store = MemoryDocumentStore::new();
        let mut state = MatchState::new(key(), MatchSettings::default());
        state.settings.sections = vec![SectionId::End(1), SectionId::End(2)];
        store.insert(
            &key(),
            DocumentName::Settings,
            serde_json::to_value(SettingsDocument::from_state(&state)).unwrap(),
        );
        let handle = store_handle(&store);

        let loaded = load_match(Some(&handle), &key(), &MatchSettings::default(), 0)
            .await
            .unwrap();
        assert!(loaded.healed_schedule);
        assert!(schedule_is_consistent(&loaded.state.settings));
        assert_eq!(loaded.state.section(), SectionId::Standby);
    }

    #[tokio::test]
    async fn corrupt_game_document_is_replaced() {
        let store = MemoryDocumentStore::new();
        store.insert(&key(), DocumentName::Game, json!({"progress": "garbage"}));
        let handle = store_handle(&store);

        let loaded = load_match(Some(&handle), &key(), &MatchSettings::default(), 0)
            .await
            .unwrap();
        assert_eq!(loaded.game, Origin::Synthesized);
        assert_eq!(loaded.state.progress.section_index, 0);
    }

    #[tokio::test]
    async fn unreachable_store_fails_the_load() {
        let store = MemoryDocumentStore::new();
        store.fail_reads(true);
        let handle = store_handle(&store);

        let result = load_match(Some(&handle), &key(), &MatchSettings::default(), 0).await;
        assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    }

    #[tokio::test]
    async fn degraded_mode_uses_defaults() {
        let loaded = load_match(None, &key(), &MatchSettings::default(), 0)
            .await
            .unwrap();
        assert_eq!(loaded.state.settings.red_name, MatchSettings::default().red_name);
    }
}
