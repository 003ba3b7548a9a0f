//! Payloads of the controller REST API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{
    match_state::MatchState,
    reducer::{MatchEffect, Reduction},
    session::Language,
};

/// Answer to opening a match.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchOpenedResponse {
    /// At least one document was missing or unreadable and was rebuilt.
    pub synthesized: bool,
    pub state: MatchState,
}

/// Outcome of one dispatched action.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub version: u64,
    /// Whether the action modified the match.
    pub changed: bool,
    pub effects: Vec<MatchEffect>,
    pub state: MatchState,
}

impl From<Reduction> for ActionResponse {
    fn from(reduction: Reduction) -> Self {
        Self {
            version: reduction.state.version,
            changed: reduction.changed(),
            effects: reduction.effects,
            state: reduction.state,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LanguageRequest {
    pub language: Language,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LanguageResponse {
    pub language: Language,
    /// False when the match already used this language.
    pub changed: bool,
}
