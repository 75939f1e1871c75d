//! Forward-auth access check.
//!
//! # Purpose
//! Lets a reverse proxy or page server ask whether the caller may open a
//! path, so page routes share the guard's policy table.
//!
//! # Response contract
//! - `204 No Content` when the path is allowed.
//! - `303 See Other` with `Location` when the caller must log in or verify.
//! - `403 Forbidden` otherwise.
use crate::api::error::ApiError;
use crate::api::required_param;
use crate::app::AppState;
use crate::guard::{RequestContext, decision_response};
use axum::extract::{Query, State};
use axum::response::Response;
use std::collections::HashMap;

#[utoipa::path(
    get,
    path = "/v1/access/check",
    tag = "access",
    params(("path" = String, Query, description = "Path and optional query string to evaluate")),
    responses(
        (status = 204, description = "Access allowed"),
        (status = 303, description = "Redirect to login or verification"),
        (status = 403, description = "Access denied", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn check_access(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let path: String = required_param(&params, "path")?;
    let decision = state.evaluator.evaluate(ctx.identity.as_ref(), &path);
    metrics::counter!("gatekeeper_access_checks_total", "decision" => decision.as_str())
        .increment(1);
    Ok(decision_response(&decision))
}
