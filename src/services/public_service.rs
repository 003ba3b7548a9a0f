//! Read-only access to match snapshots for polling clients.

use crate::{
    dto::public::SnapshotResponse,
    error::ServiceError,
    services::viewer_feed,
    state::{SharedState, clock::wall_clock_ms, match_state::MatchKey},
};

/// Latest snapshot of `key`, or `None` when the caller already holds version `since`
/// or newer.
pub async fn snapshot(
    state: &SharedState,
    key: &MatchKey,
    since: Option<u64>,
) -> Result<Option<SnapshotResponse>, ServiceError> {
    let snapshot = viewer_feed::latest_snapshot(state, key)
        .await
        .ok_or_else(|| ServiceError::NotFound(format!("match {key} could not be loaded")))?;

    if since.is_some_and(|since| snapshot.version <= since) {
        return Ok(None);
    }
    Ok(Some(SnapshotResponse::new(snapshot, wall_clock_ms())))
}
