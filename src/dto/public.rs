use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{format_epoch_ms, validation::validate_identifier},
    state::match_state::{MatchKey, MatchState},
};

/// Path address of a match.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct MatchPath {
    /// Tournament event identifier.
    pub event_id: String,
    /// Court identifier within the event.
    pub court_id: String,
}

impl Validate for MatchPath {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_identifier(&self.event_id) {
            errors.add("event_id", e);
        }
        if let Err(e) = validate_identifier(&self.court_id) {
            errors.add("court_id", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl MatchPath {
    pub fn key(&self) -> MatchKey {
        MatchKey::new(&self.event_id, &self.court_id)
    }
}

/// Query of the polling endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SnapshotQuery {
    /// Version already held by the caller; a response is only sent when newer.
    pub since: Option<u64>,
}

/// Latest snapshot of a match.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub version: u64,
    /// RFC 3339 rendering of the last mutation time.
    pub updated_at: String,
    /// Server time (epoch milliseconds) the running clocks can be projected from.
    pub server_time_ms: i64,
    pub state: MatchState,
}

impl SnapshotResponse {
    pub fn new(state: MatchState, server_time_ms: i64) -> Self {
        Self {
            version: state.version,
            updated_at: format_epoch_ms(state.last_updated_ms),
            server_time_ms,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_path_rejects_unsafe_identifiers() {
        let valid = MatchPath {
            event_id: "spring-cup".into(),
            court_id: "3".into(),
        };
        assert!(valid.validate().is_ok());
        assert_eq!(valid.key(), MatchKey::new("spring-cup", "3"));

        let invalid = MatchPath {
            event_id: "..".into(),
            court_id: "".into(),
        };
        let errors = invalid.validate().unwrap_err();
        assert_eq!(errors.field_errors().len(), 2);
    }

    #[test]
    fn snapshot_response_formats_update_time() {
        let mut state = MatchState::new(
            MatchKey::new("cup", "1"),
            crate::state::match_state::MatchSettings::default(),
        );
        state.last_updated_ms = 0;
        let response = SnapshotResponse::new(state, 5);
        assert_eq!(response.updated_at, "1970-01-01T00:00:00Z");
    }
}
