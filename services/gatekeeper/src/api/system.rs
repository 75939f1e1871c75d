//! System/health API handlers.
use crate::api::error::{ApiError, api_not_found, api_unavailable};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/v1/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Gatekeeper health", body = HealthStatus),
        (status = 503, description = "Storage unavailable", body = crate::api::types::ErrorResponse)
    )
)]
/// Probe the backing store and report `ok` when it answers.
pub(crate) async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    if let Err(err) = state.store.health_check().await {
        return Err(api_unavailable("storage unavailable", &err));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        backend: state.store.backend_name().to_string(),
    }))
}

/// Fallback for unmatched routes. Still runs behind the route guard.
pub(crate) async fn not_found() -> ApiError {
    api_not_found("route not found")
}
