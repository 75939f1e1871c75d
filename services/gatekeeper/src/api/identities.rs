//! Identity API handlers.
use crate::api::error::ApiError;
use crate::api::require_identity;
use crate::api::types::IdentityResponse;
use crate::guard::RequestContext;
use axum::Json;

#[utoipa::path(
    get,
    path = "/v1/identities/me",
    tag = "identities",
    responses(
        (status = 200, description = "Caller identity", body = IdentityResponse),
        (status = 401, description = "No valid session", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn current_identity(ctx: RequestContext) -> Result<Json<IdentityResponse>, ApiError> {
    let identity = require_identity(&ctx)?;
    Ok(Json(identity.clone().into()))
}
