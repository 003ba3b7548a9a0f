use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use validator::Validate;

use crate::{
    dto::{
        controller::{ActionResponse, LanguageRequest, LanguageResponse, MatchOpenedResponse},
        public::MatchPath,
    },
    error::AppError,
    services::{controller_service, sse_service},
    state::{SharedState, reducer::MatchAction},
};

const CONTROLLER_TOKEN_HEADER: &str = "x-controller-token";

/// Operator endpoints driving a match. Every call requires the lease token handed
/// out by the controller SSE stream of the same match.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route(
            "/controller/matches/{event_id}/{court_id}/open",
            post(open_match),
        )
        .route(
            "/controller/matches/{event_id}/{court_id}/actions",
            post(dispatch_action),
        )
        .route(
            "/controller/matches/{event_id}/{court_id}/language",
            post(change_language),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            require_controller_token,
        ))
}

/// Load the match (synthesizing missing documents) and start its clock.
#[utoipa::path(
    post,
    path = "/controller/matches/{event_id}/{court_id}/open",
    tag = "controller",
    params(
        MatchPath,
        ("X-Controller-Token" = String, Header, description = "Lease token issued by the controller SSE stream")
    ),
    responses(
        (status = 200, description = "Match is open", body = MatchOpenedResponse),
        (status = 401, description = "Missing or stale controller token"),
        (status = 503, description = "Storage unreachable while loading")
    )
)]
pub async fn open_match(
    State(state): State<SharedState>,
    Path(path): Path<MatchPath>,
) -> Result<Json<MatchOpenedResponse>, AppError> {
    let opened = controller_service::open_match(&state, &path.key()).await?;
    Ok(Json(opened))
}

/// Apply one operator action and return the resulting state.
#[utoipa::path(
    post,
    path = "/controller/matches/{event_id}/{court_id}/actions",
    tag = "controller",
    request_body = MatchAction,
    params(
        MatchPath,
        ("X-Controller-Token" = String, Header, description = "Lease token issued by the controller SSE stream")
    ),
    responses(
        (status = 200, description = "Action applied", body = ActionResponse),
        (status = 400, description = "Action arguments are invalid"),
        (status = 409, description = "Action not allowed in the current state")
    )
)]
pub async fn dispatch_action(
    State(state): State<SharedState>,
    Path(path): Path<MatchPath>,
    Json(action): Json<MatchAction>,
) -> Result<Json<ActionResponse>, AppError> {
    let response = controller_service::dispatch(&state, &path.key(), action).await?;
    Ok(Json(response))
}

/// Switch the display language of every screen attached to the match.
#[utoipa::path(
    post,
    path = "/controller/matches/{event_id}/{court_id}/language",
    tag = "controller",
    request_body = LanguageRequest,
    params(
        MatchPath,
        ("X-Controller-Token" = String, Header, description = "Lease token issued by the controller SSE stream")
    ),
    responses((status = 200, description = "Language applied", body = LanguageResponse))
)]
pub async fn change_language(
    State(state): State<SharedState>,
    Path(path): Path<MatchPath>,
    Json(payload): Json<LanguageRequest>,
) -> Result<Json<LanguageResponse>, AppError> {
    let response =
        controller_service::change_language(&state, &path.key(), payload.language).await;
    Ok(Json(response))
}

async fn require_controller_token(
    State(state): State<SharedState>,
    Path(path): Path<MatchPath>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    path.validate()?;
    let provided = req
        .headers()
        .get(CONTROLLER_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing controller token header `X-Controller-Token`".into())
        })?;

    let session = state.find_session(&path.key()).ok_or_else(|| {
        AppError::Unauthorized("no controller stream is connected to this match".into())
    })?;
    sse_service::verify_controller_token(&session, Some(&provided)).await?;
    Ok(next.run(req).await)
}
