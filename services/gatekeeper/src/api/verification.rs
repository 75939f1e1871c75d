//! Verification API handlers for applicants.
//!
//! # Purpose
//! Lets an authenticated identity apply for an elevated role and poll the
//! state of its latest application.
use crate::api::error::{ApiError, api_forbidden};
use crate::api::types::{
    SubmitVerificationRequest, SubmitVerificationResponse, VerificationStatusResponse,
};
use crate::api::{query_param, require_identity, required_param};
use crate::app::AppState;
use crate::guard::RequestContext;
use crate::model::{IdentityId, Role, TargetRole};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use std::collections::HashMap;

#[utoipa::path(
    post,
    path = "/v1/verification/requests",
    tag = "verification",
    request_body = SubmitVerificationRequest,
    responses(
        (status = 201, description = "Request submitted", body = SubmitVerificationResponse),
        (status = 400, description = "Invalid payload", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Not allowed to apply for this identity", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Unknown identity", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Pending request exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn submit_verification(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(body): Json<SubmitVerificationRequest>,
) -> Result<(StatusCode, Json<SubmitVerificationResponse>), ApiError> {
    let caller = require_identity(&ctx)?;
    if caller.id != body.identity_id && caller.base_role != Role::Admin {
        return Err(api_forbidden("cannot apply on behalf of another identity"));
    }
    let request = state
        .workflow
        .submit(body.identity_id, body.target_role, body.payload)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitVerificationResponse {
            id: request.id,
            state: request.state,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/verification/status",
    tag = "verification",
    params(
        ("identity_id" = Option<String>, Query, description = "Identity to query; defaults to the caller"),
        ("target_role" = String, Query, description = "recruiter or instructor")
    ),
    responses(
        (status = 200, description = "Latest request state", body = VerificationStatusResponse),
        (status = 400, description = "Invalid query", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Not allowed to read this identity", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn verification_status(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<VerificationStatusResponse>, ApiError> {
    let caller = require_identity(&ctx)?;
    let target_role: TargetRole = required_param(&params, "target_role")?;
    let identity_id: IdentityId = query_param(&params, "identity_id")?.unwrap_or(caller.id);
    if identity_id != caller.id && caller.base_role != Role::Admin {
        return Err(api_forbidden("cannot read another identity's status"));
    }
    let status = state
        .workflow
        .current_status(identity_id, target_role)
        .await?;
    Ok(Json(VerificationStatusResponse {
        identity_id,
        target_role,
        state: status,
    }))
}
