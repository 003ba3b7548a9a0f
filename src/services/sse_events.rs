//! Encoding of server events and fan-out to the SSE hubs of a match.

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{EffectBatch, Handshake, LanguageChanged, ServerEvent, SystemStatus, ViewerCue},
    state::{
        SharedState,
        match_state::MatchState,
        reducer::Reduction,
        session::{Language, MatchSession},
    },
};

const EVENT_HANDSHAKE: &str = "handshake";
const EVENT_SNAPSHOT: &str = "snapshot";
const EVENT_CUE: &str = "cue";
const EVENT_EFFECTS: &str = "effects";
const EVENT_LANGUAGE_CHANGED: &str = "language.changed";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// First event of every stream.
pub fn handshake_event(handshake: &Handshake) -> Option<ServerEvent> {
    encode(EVENT_HANDSHAKE, handshake)
}

/// Full snapshot of a match.
pub fn snapshot_event(state: &MatchState) -> Option<ServerEvent> {
    encode(EVENT_SNAPSHOT, state)
}

/// Viewer cue derived from a snapshot change.
pub fn cue_event(cue: &ViewerCue) -> Option<ServerEvent> {
    encode(EVENT_CUE, cue)
}

/// Send the outcome of an accepted action to the controller stream: the new snapshot
/// when something changed, then the effects.
pub fn broadcast_controller_update(session: &MatchSession, reduction: &Reduction, action: &str) {
    let hub = session.channels().controller().hub();
    if reduction.changed() {
        if let Some(event) = snapshot_event(&reduction.state) {
            hub.broadcast(event);
        }
    }
    if reduction.effects.is_empty() {
        return;
    }
    let batch = EffectBatch {
        version: reduction.state.version,
        action: action.to_owned(),
        effects: reduction.effects.clone(),
    };
    if let Some(event) = encode(EVENT_EFFECTS, &batch) {
        hub.broadcast(event);
    }
}

/// Tell every stream of the match about its new display language.
pub fn broadcast_language_changed(session: &MatchSession, language: Language) {
    if let Some(event) = encode(EVENT_LANGUAGE_CHANGED, &LanguageChanged { language }) {
        session.channels().broadcast_all(event);
    }
}

/// Tell every stream of every match whether storage is available.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    let Some(event) = encode(EVENT_SYSTEM_STATUS, &SystemStatus { degraded }) else {
        return;
    };
    for session in state.sessions() {
        session.channels().broadcast_all(event.clone());
    }
}

fn encode(event: &str, payload: &impl Serialize) -> Option<ServerEvent> {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(event, error = %err, "failed to serialize SSE payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        match_state::{MatchKey, MatchSettings},
        reducer::{MatchAction, reduce},
    };

    #[tokio::test]
    async fn controller_receives_snapshot_then_effects() {
        let session = MatchSession::new(MatchKey::new("cup", "1"), 8);
        let mut receiver = session.channels().controller().hub().subscribe();
        let state = MatchState::new(MatchKey::new("cup", "1"), MatchSettings::default());
        let reduction = reduce(&state, MatchAction::Advance, 10).unwrap();

        broadcast_controller_update(&session, &reduction, "advance");

        let snapshot = receiver.recv().await.unwrap();
        assert_eq!(snapshot.event.as_deref(), Some("snapshot"));
        let effects = receiver.recv().await.unwrap();
        assert_eq!(effects.event.as_deref(), Some("effects"));
        assert!(effects.data.contains("\"action\":\"advance\""));
    }

    #[tokio::test]
    async fn language_change_reaches_viewers_and_controller() {
        let session = MatchSession::new(MatchKey::new("cup", "1"), 8);
        let mut viewer = session.channels().viewer().subscribe();
        let mut controller = session.channels().controller().hub().subscribe();

        broadcast_language_changed(&session, Language::Ja);

        assert_eq!(viewer.recv().await.unwrap().data, "{\"language\":\"ja\"}");
        assert_eq!(
            controller.recv().await.unwrap().event.as_deref(),
            Some("language.changed")
        );
    }
}
