use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Courtboard Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::match_stream,
        crate::routes::public::get_snapshot,
        crate::routes::controller::open_match,
        crate::routes::controller::dispatch_action,
        crate::routes::controller::change_language,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::public::SnapshotResponse,
            crate::dto::controller::MatchOpenedResponse,
            crate::dto::controller::ActionResponse,
            crate::dto::controller::LanguageRequest,
            crate::dto::controller::LanguageResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::LanguageChanged,
            crate::dto::sse::EffectBatch,
            crate::dto::sse::ViewerCue,
            crate::dto::sse::StreamRole,
            crate::state::match_state::MatchState,
            crate::state::reducer::MatchAction,
            crate::state::reducer::MatchEffect,
            crate::state::session::Language,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "public", description = "Read-only polling of match snapshots"),
        (name = "controller", description = "Operator actions on a match"),
    )
)]
pub struct ApiDoc;
