use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use axum_valid::Valid;

use crate::{
    dto::{
        public::MatchPath,
        sse::{StreamQuery, StreamRole},
    },
    error::AppError,
    services::sse_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/matches/{event_id}/{court_id}",
    tag = "sse",
    params(MatchPath, StreamQuery),
    responses(
        (status = 200, description = "Match event stream", content_type = "text/event-stream", body = String),
        (status = 401, description = "Another controller stream is already connected")
    )
)]
/// Stream a match. Viewers get snapshots and cues; the single controller stream
/// additionally receives its lease token and per-action effects.
pub async fn match_stream(
    State(state): State<SharedState>,
    Valid(Path(path)): Valid<Path<MatchPath>>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let key = path.key();
    let receiver = match query.role {
        StreamRole::Viewer => {
            info!(%key, "new viewer SSE connection");
            sse_service::open_viewer_stream(state, key).await
        }
        StreamRole::Controller => {
            info!(%key, "new controller SSE connection");
            sse_service::open_controller_stream(state, key, query.lang).await?
        }
    };
    Ok(sse_service::to_sse_stream(receiver))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/matches/{event_id}/{court_id}", get(match_stream))
}
