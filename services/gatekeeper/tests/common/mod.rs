#![allow(dead_code)]

use axum::Router;
use axum::response::Response;
use campus_authz::{AccessPolicy, EvaluatorConfig, PolicyEvaluator, UnverifiedAccess};
use gatekeeper::app::{AppState, build_internal_router, build_router};
use gatekeeper::auth::session::SessionIssuer;
use gatekeeper::model::Identity;
use gatekeeper::workflow::SharedStore;
use std::time::Duration;

pub const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const INTERNAL_TOKEN: &str = "internal-test-token";
pub const ROOT_ADMIN: &str = "root@example.com";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub internal: Router,
}

pub fn test_app(store: SharedStore) -> TestApp {
    test_app_with(store, UnverifiedAccess::Forbid)
}

pub fn test_app_with(store: SharedStore, unverified_access: UnverifiedAccess) -> TestApp {
    let evaluator = PolicyEvaluator::with_config(
        AccessPolicy::platform_default(),
        EvaluatorConfig {
            unverified_access,
            ..EvaluatorConfig::default()
        },
    );
    let state = AppState::new(
        store,
        evaluator,
        SessionIssuer::new(SESSION_SECRET, "campus-gatekeeper", Duration::from_secs(600)),
        &[ROOT_ADMIN.to_string()],
        Some(INTERNAL_TOKEN.to_string()),
    );
    TestApp {
        router: build_router(state.clone()),
        internal: build_internal_router(state.clone()),
        state,
    }
}

/// Authenticate `email` the way the login front end would and mint a session.
pub async fn login(app: &TestApp, email: &str) -> (Identity, String) {
    let identity = app
        .state
        .identities
        .authenticate(email, None)
        .await
        .expect("authenticate");
    let session = app.state.sessions.mint(identity.id).expect("mint");
    (identity, session.token)
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

pub fn location(response: &Response) -> Option<String> {
    response
        .headers()
        .get(axum::http::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
