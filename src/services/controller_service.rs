//! Controller operations. Every mutation of a match goes through [`apply`], which
//! serializes it on the session lock, runs the reducer and fans the result out: the
//! shared store synchronously, the document store asynchronously, and the
//! controller stream.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    dto::controller::{ActionResponse, LanguageResponse, MatchOpenedResponse},
    error::ServiceError,
    services::{
        bootstrap_service::{self, Origin},
        clock_driver, persistence, sse_events,
    },
    state::{
        SharedState,
        clock::wall_clock_ms,
        match_state::{MatchKey, MatchState},
        reducer::{MatchAction, Reduction, reduce},
        session::{Language, MatchSession},
    },
};

/// Load the match into memory and start its background workers. Opening an
/// already open match returns its current state.
pub async fn open_match(
    state: &SharedState,
    key: &MatchKey,
) -> Result<MatchOpenedResponse, ServiceError> {
    let session = state.session(key);
    let mut guard = session.lock().await;
    if let Some(current) = guard.as_ref() {
        return Ok(MatchOpenedResponse {
            synthesized: false,
            state: current.clone(),
        });
    }

    let store = state.document_store().await;
    let loaded = bootstrap_service::load_match(
        store.as_ref(),
        key,
        &state.config().default_settings,
        wall_clock_ms(),
    )
    .await?;
    if let Some(store) = store.as_ref() {
        bootstrap_service::write_back(store, &loaded).await;
    }

    let synthesized = loaded.settings == Origin::Synthesized || loaded.game == Origin::Synthesized;
    publish(state, &loaded.state);
    *guard = Some(loaded.state.clone());
    drop(guard);

    start_workers(state, &session);
    info!(%key, version = loaded.state.version, synthesized, "match opened");
    Ok(MatchOpenedResponse {
        synthesized,
        state: loaded.state,
    })
}

/// Apply one operator action to an open match.
pub async fn dispatch(
    state: &SharedState,
    key: &MatchKey,
    action: MatchAction,
) -> Result<ActionResponse, ServiceError> {
    let session = state
        .find_session(key)
        .ok_or_else(|| ServiceError::InvalidState(format!("match {key} has not been opened")))?;
    let reduction = apply(state, &session, action, wall_clock_ms()).await?;
    Ok(reduction.into())
}

/// Change the display language of a match and notify all its streams.
pub async fn change_language(
    state: &SharedState,
    key: &MatchKey,
    language: Language,
) -> LanguageResponse {
    let session = state.session(key);
    let changed = session.set_language(language);
    if changed {
        sse_events::broadcast_language_changed(&session, language);
        info!(%key, %language, "display language changed");
    }
    LanguageResponse { language, changed }
}

/// Reduce `action` against the session's state and propagate the outcome.
pub async fn apply(
    state: &SharedState,
    session: &MatchSession,
    action: MatchAction,
    now_ms: i64,
) -> Result<Reduction, ServiceError> {
    let name = action.name();
    let mut guard = session.lock().await;
    let current = guard.as_ref().ok_or_else(|| {
        ServiceError::InvalidState(format!("match {} has not been opened", session.key()))
    })?;

    let reduction = reduce(current, action, now_ms).inspect_err(|err| {
        debug!(key = %session.key(), action = name, error = %err, "action rejected");
    })?;

    if reduction.changed() {
        *guard = Some(reduction.state.clone());
        publish(state, &reduction.state);
        session.writes().enqueue_state(
            &reduction.state,
            reduction.settings_changed,
            reduction.progress_changed,
        );
    }
    drop(guard);

    sse_events::broadcast_controller_update(session, &reduction, name);
    Ok(reduction)
}

fn publish(state: &SharedState, snapshot: &MatchState) {
    if let Err(err) = state.shared().publish(snapshot) {
        warn!(key = %snapshot.key, error = %err, "failed to publish snapshot");
    }
}

fn start_workers(state: &SharedState, session: &Arc<MatchSession>) {
    if !session.claim_workers() {
        return;
    }
    tokio::spawn(persistence::run_writer(
        state.clone(),
        session.key().clone(),
        session.writes().clone(),
    ));
    tokio::spawn(clock_driver::run(
        state.clone(),
        Arc::downgrade(session),
        state.config().tick_interval,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::document_store::{DocumentName, memory::MemoryDocumentStore},
        state::{AppState, match_state::Side, sections::SectionId},
    };

    async fn opened(store: &MemoryDocumentStore) -> (SharedState, MatchKey) {
        let state = AppState::new(AppConfig::default());
        state.set_document_store(Arc::new(store.clone())).await;
        let key = MatchKey::new("cup", "1");
        open_match(&state, &key).await.unwrap();
        (state, key)
    }

    #[tokio::test]
    async fn opening_synthesizes_and_writes_back_once() {
        let store = MemoryDocumentStore::new();
        let (state, key) = opened(&store).await;
        assert_eq!(store.write_count(), 2);

        let again = open_match(&state, &key).await.unwrap();
        assert!(!again.synthesized);
        assert_eq!(store.write_count(), 2);
        assert!(state.shared().read(&key).is_some());
    }

    #[tokio::test]
    async fn actions_are_mirrored_into_the_shared_store() {
        let store = MemoryDocumentStore::new();
        let (state, key) = opened(&store).await;

        let response = dispatch(&state, &key, MatchAction::Advance).await.unwrap();
        assert!(response.changed);
        assert_eq!(response.version, 1);

        let shared = state.shared().read(&key).unwrap().unwrap();
        assert_eq!(shared.version, 1);
        assert_ne!(shared.section(), SectionId::Standby);
    }

    #[tokio::test]
    async fn rejected_actions_leave_the_state_untouched() {
        let store = MemoryDocumentStore::new();
        let (state, key) = opened(&store).await;

        let result = dispatch(&state, &key, MatchAction::RecordThrow { side: Side::Red }).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        let shared = state.shared().read(&key).unwrap().unwrap();
        assert_eq!(shared.version, 0);
    }

    #[tokio::test]
    async fn dispatch_requires_an_open_match() {
        let state = AppState::new(AppConfig::default());
        let key = MatchKey::new("cup", "7");
        let result = dispatch(&state, &key, MatchAction::Advance).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        assert!(state.find_session(&key).is_none());

        state.attach_session(&key);
        let result = dispatch(&state, &key, MatchAction::Advance).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn failed_writes_do_not_affect_the_match() {
        let store = MemoryDocumentStore::new();
        let (state, key) = opened(&store).await;
        store.fail_writes(true);

        let session = state.session(&key);
        apply(&state, &session, MatchAction::Advance, 5).await.unwrap();
        persistence::flush(&state, &key, session.writes()).await;

        assert_eq!(session.snapshot().await.unwrap().version, 1);
        assert_eq!(state.shared().read(&key).unwrap().unwrap().version, 1);
        let stored = store.get(&key, DocumentName::Game).unwrap();
        assert_eq!(stored["version"], 0);
    }

    #[tokio::test]
    async fn language_changes_are_idempotent() {
        let state = AppState::new(AppConfig::default());
        let key = MatchKey::new("cup", "1");
        assert!(change_language(&state, &key, Language::Ja).await.changed);
        assert!(!change_language(&state, &key, Language::Ja).await.changed);
    }
}
