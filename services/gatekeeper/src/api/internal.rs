//! Internal session endpoint.
//!
//! # Purpose
//! Called by the trusted login front end after it has authenticated a user.
//! Resolves (or creates) the identity and mints a session token for it.
//!
//! # Security considerations
//! - Served only on the internal listener.
//! - Requires the shared `X-Gatekeeper-Internal-Token` header, compared in
//!   constant time.
use crate::api::error::{ApiError, api_internal_message, api_unauthorized};
use crate::api::types::{CreateSessionRequest, CreateSessionResponse};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

pub const INTERNAL_TOKEN_HEADER: &str = "X-Gatekeeper-Internal-Token";

#[utoipa::path(
    post,
    path = "/internal/sessions",
    tag = "internal",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session issued", body = CreateSessionResponse),
        (status = 400, description = "Invalid email", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing or invalid internal token", body = crate::api::types::ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    ensure_internal_authorized(&state, &headers)?;

    let identity = state
        .identities
        .authenticate(&body.email, body.display_name)
        .await?;
    let session = state.sessions.mint(identity.id).map_err(|err| {
        tracing::error!(error = %err, "failed to mint session token");
        api_internal_message("failed to issue session")
    })?;
    tracing::info!(identity_id = %identity.id, "session issued");
    Ok(Json(CreateSessionResponse {
        identity: identity.into(),
        token: session.token,
        expires_at: session.expires_at,
    }))
}

fn ensure_internal_authorized(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = match headers.get(INTERNAL_TOKEN_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| api_unauthorized("invalid internal token"))?,
        None => return Err(api_unauthorized("missing internal token")),
    };

    let expected = state
        .internal_token
        .as_ref()
        .ok_or_else(|| api_internal_message("internal token not configured"))?;

    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(api_unauthorized("invalid internal token"));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (left, right) in a.iter().zip(b.iter()) {
        diff |= left ^ right;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_compares_contents() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }
}
