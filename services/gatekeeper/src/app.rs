//! Gatekeeper HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum routers, installs the route guard and tracing middleware,
//! and defines the shared application state injected into handlers.
//!
//! # Notes
//! The route guard is applied once to the whole public router, including the
//! fallback, so no path can skip policy evaluation. The internal router is
//! served on its own listener and is not guarded by session policy.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::session::SessionIssuer;
use crate::guard;
use crate::identity::IdentityService;
use crate::observability;
use crate::workflow::{SharedStore, VerificationWorkflow};
use axum::Router;
use campus_authz::PolicyEvaluator;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub evaluator: Arc<PolicyEvaluator>,
    pub sessions: SessionIssuer,
    pub workflow: VerificationWorkflow,
    pub identities: IdentityService,
    pub internal_token: Option<String>,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        evaluator: PolicyEvaluator,
        sessions: SessionIssuer,
        initial_admins: &[String],
        internal_token: Option<String>,
    ) -> Self {
        Self {
            workflow: VerificationWorkflow::new(store.clone()),
            identities: IdentityService::new(store.clone(), initial_admins),
            store,
            evaluator: Arc::new(evaluator),
            sessions,
            internal_token,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %request.uri().path(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route(
            "/v1/access/check",
            axum::routing::get(api::access::check_access),
        )
        .route(
            "/v1/identities/me",
            axum::routing::get(api::identities::current_identity),
        )
        .route(
            "/v1/verification/requests",
            axum::routing::post(api::verification::submit_verification),
        )
        .route(
            "/v1/verification/status",
            axum::routing::get(api::verification::verification_status),
        )
        .route(
            "/v1/admin/verification/requests",
            axum::routing::get(api::admin::list_verification_requests),
        )
        .route(
            "/v1/admin/verification/reviews",
            axum::routing::post(api::admin::review_request),
        )
        .route(
            "/v1/admin/verification/reconcile",
            axum::routing::post(api::admin::reconcile),
        )
        .route(
            "/v1/admin/identities/:identity_id/role",
            axum::routing::put(api::admin::assign_role),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .fallback(api::system::not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            guard::route_guard,
        ))
        .layer(trace_layer)
        .with_state(state)
}

pub fn build_internal_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/internal/sessions",
            axum::routing::post(api::internal::create_session),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
