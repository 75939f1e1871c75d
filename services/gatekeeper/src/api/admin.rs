//! Admin API handlers.
//!
//! # Purpose
//! Review queue, review decisions, reconciliation, and role assignment. The
//! route guard already restricts `/v1/admin` to admins; handlers re-check the
//! caller because the rule table is configurable.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{
    AssignRoleRequest, IdentityResponse, ReviewDecision, ReviewRequest,
    VerificationRequestListResponse,
};
use crate::api::{query_param, require_admin};
use crate::app::AppState;
use crate::guard::RequestContext;
use crate::model::{IdentityId, RequestFilter, VerificationRequest};
use crate::workflow::ReconcileReport;
use axum::Json;
use axum::extract::{Path, Query, State};
use std::collections::HashMap;

#[utoipa::path(
    post,
    path = "/v1/admin/verification/reviews",
    tag = "admin",
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Request reviewed", body = VerificationRequest),
        (status = 400, description = "Rejection without reason", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown request", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Already reviewed", body = crate::api::types::ErrorResponse),
        (status = 503, description = "Review recorded, identity update pending", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn review_request(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<VerificationRequest>, ApiError> {
    let reviewer = require_admin(&ctx)?;
    let request = match body.decision {
        ReviewDecision::Approve => state.workflow.approve(body.request_id, reviewer.id).await?,
        ReviewDecision::Reject => {
            let reason = body
                .reason
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .ok_or_else(|| api_validation_error("reason is required when rejecting"))?;
            state
                .workflow
                .reject(body.request_id, reviewer.id, reason)
                .await?
        }
    };
    Ok(Json(request))
}

#[utoipa::path(
    get,
    path = "/v1/admin/verification/requests",
    tag = "admin",
    params(
        ("state" = Option<String>, Query, description = "pending, approved or rejected"),
        ("identity_id" = Option<String>, Query, description = "Restrict to one identity"),
        ("needs_reconciliation" = Option<bool>, Query, description = "Only flagged requests")
    ),
    responses(
        (status = 200, description = "Matching requests", body = VerificationRequestListResponse),
        (status = 400, description = "Invalid filter", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_verification_requests(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<VerificationRequestListResponse>, ApiError> {
    require_admin(&ctx)?;
    let filter = RequestFilter {
        identity_id: query_param(&params, "identity_id")?,
        state: query_param(&params, "state")?,
        needs_reconciliation: query_param(&params, "needs_reconciliation")?,
    };
    let items = state.workflow.list_requests(&filter).await?;
    Ok(Json(VerificationRequestListResponse { items }))
}

#[utoipa::path(
    post,
    path = "/v1/admin/verification/reconcile",
    tag = "admin",
    responses(
        (status = 200, description = "Reconciliation pass result", body = ReconcileReport)
    )
)]
pub(crate) async fn reconcile(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<ReconcileReport>, ApiError> {
    require_admin(&ctx)?;
    Ok(Json(state.workflow.reconcile().await?))
}

#[utoipa::path(
    put,
    path = "/v1/admin/identities/{identity_id}/role",
    tag = "admin",
    params(("identity_id" = String, Path, description = "Identity identifier")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = IdentityResponse),
        (status = 400, description = "Invalid identity id", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown identity", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn assign_role(
    Path(identity_id): Path<String>,
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<AssignRoleRequest>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let actor = require_admin(&ctx)?;
    let identity_id: IdentityId = identity_id
        .parse()
        .map_err(|_| api_validation_error("invalid identity id"))?;
    let updated = state
        .identities
        .assign_role(actor.id, identity_id, body.role)
        .await?;
    Ok(Json(updated.into()))
}
