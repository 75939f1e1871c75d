//! Route guard middleware.
//!
//! # Purpose
//! Runs once per request in front of every route. It resolves the caller's
//! identity from the session token, asks the policy evaluator for a decision,
//! and either forwards the request or answers with a redirect or a 403.
//!
//! # Key invariants
//! - Exactly one identity lookup per request.
//! - Authentication failures never surface as errors here; the caller is
//!   treated as anonymous and the policy decides.
//! - The guard never mutates identities or verification requests.
//! - Handlers receive the resolved identity through [`RequestContext`], never
//!   through ambient state.
use crate::api::error::api_forbidden;
use crate::app::AppState;
use crate::model::Identity;
use crate::store::StoreError;
use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use campus_authz::Decision;
use std::convert::Infallible;

pub const SESSION_COOKIE: &str = "gk_session";

/// Per-request identity resolved by the guard.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

pub async fn route_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let identity = resolve_identity(&state, request.headers()).await;
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let decision = state.evaluator.evaluate(identity.as_ref(), &target);
    metrics::counter!("gatekeeper_guard_decisions_total", "decision" => decision.as_str())
        .increment(1);
    tracing::debug!(
        path = %request.uri().path(),
        decision = decision.as_str(),
        identity_id = ?identity.as_ref().map(|identity| identity.id),
        "route guard decision"
    );

    if decision.is_allow() {
        request.extensions_mut().insert(RequestContext { identity });
        return next.run(request).await;
    }
    decision_response(&decision)
}

/// HTTP rendering of a policy decision: 204, 303 with `Location`, or 403.
pub fn decision_response(decision: &Decision) -> Response {
    match decision {
        Decision::Allow => StatusCode::NO_CONTENT.into_response(),
        Decision::DenyRedirect(location) => Redirect::to(location).into_response(),
        Decision::DenyForbidden => api_forbidden("access denied").into_response(),
    }
}

/// Load the identity named by the request's session token, if any.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    let token = session_token(headers)?;
    let identity_id = match state.sessions.verify(token) {
        Ok(id) => id,
        Err(err) => {
            tracing::debug!(error = %err, "ignoring invalid session token");
            return None;
        }
    };
    match state.store.get_identity(identity_id).await {
        Ok(identity) => Some(identity),
        Err(StoreError::NotFound(_)) => {
            tracing::debug!(%identity_id, "session names an unknown identity");
            None
        }
        Err(err) => {
            tracing::warn!(%identity_id, error = %err, "identity lookup failed; treating as anonymous");
            None
        }
    }
}

/// Bearer token from `Authorization`, falling back to the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token);
            }
        }
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value)
}
