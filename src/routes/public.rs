use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::public::{MatchPath, SnapshotQuery, SnapshotResponse},
    error::AppError,
    services::public_service,
    state::SharedState,
};

/// Public read-only endpoints for clients that poll instead of streaming.
pub fn router() -> Router<SharedState> {
    Router::new().route("/public/matches/{event_id}/{court_id}", get(get_snapshot))
}

#[utoipa::path(
    get,
    path = "/public/matches/{event_id}/{court_id}",
    tag = "public",
    params(MatchPath, SnapshotQuery),
    responses(
        (status = 200, description = "Latest match snapshot", body = SnapshotResponse),
        (status = 304, description = "Caller already holds the latest version"),
        (status = 404, description = "Match could not be loaded")
    )
)]
/// Return the latest snapshot of a match, or 304 when `since` is current.
pub async fn get_snapshot(
    State(state): State<SharedState>,
    Valid(Path(path)): Valid<Path<MatchPath>>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Response, AppError> {
    let response = match public_service::snapshot(&state, &path.key(), query.since).await? {
        Some(snapshot) => Json(snapshot).into_response(),
        None => StatusCode::NOT_MODIFIED.into_response(),
    };
    Ok(response)
}
