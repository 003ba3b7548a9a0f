use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::state::{
    match_state::Side,
    reducer::{ClockTarget, MatchEffect},
    sections::SectionId,
    session::Language,
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from a preformatted payload.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Role of the stream (`viewer` or `controller`).
    pub stream: String,
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    pub language: Language,
    /// Lease token returned to the controller stream only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to every stream of a match when its display language changes.
pub struct LanguageChanged {
    pub language: Language,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Effects produced by one accepted action, sent to the controller.
pub struct EffectBatch {
    pub version: u64,
    pub action: String,
    pub effects: Vec<MatchEffect>,
}

/// Presentation cue derived by a viewer from two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViewerCue {
    SectionChanged {
        #[schema(value_type = String)]
        section: SectionId,
        index: usize,
    },
    ClockWarning {
        clock: ClockTarget,
        threshold_ms: u64,
    },
    ClockExpired {
        clock: ClockTarget,
    },
    PenaltyThrowStarted {
        side: Side,
    },
    MatchCompleted,
}

/// Which stream of a match a client subscribes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    #[default]
    Viewer,
    Controller,
}

/// Query parameters of the match stream.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// `viewer` (default) or `controller`.
    #[serde(default)]
    pub role: StreamRole,
    /// Display language; applied to the match when sent by the controller.
    pub lang: Option<Language>,
}
