use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report `ok` or `degraded`, logging storage connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_document_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "document store health check failed");
            }
        }
        Err(_) => warn!("document store unavailable (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}
