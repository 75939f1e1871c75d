//! Campus gatekeeper HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage, session issuing, and HTTP routers, then runs
//! the public API, the metrics listener, the optional internal listener, and
//! the background reconciliation task.
//!
//! # Notes
//! `build_state` keeps wiring testable and `main` minimal.
use anyhow::Context;
use gatekeeper::app::{AppState, build_internal_router, build_router};
use gatekeeper::auth::session::SessionIssuer;
use gatekeeper::config::{GatekeeperConfig, StorageBackend};
use gatekeeper::observability;
use gatekeeper::store::memory::InMemoryStore;
use gatekeeper::store::postgres::PostgresStore;
use gatekeeper::workflow::{SharedStore, run_reconciliation_loop};
use std::future::Future;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatekeeperConfig::from_env_or_yaml().context("gatekeeper config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: GatekeeperConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("gatekeeper");
    if config.session.generated_secret {
        tracing::warn!("GATEKEEPER_SESSION_SECRET not set; sessions will not survive a restart");
    }
    let state = build_state(&config).await?;
    tracing::info!(
        backend = state.store.backend_name(),
        transactional = state.store.supports_transactions(),
        rules = state.evaluator.policy().rules().len(),
        unverified_access = ?state.evaluator.config().unverified_access,
        session_ttl_secs = state.sessions.ttl().as_secs(),
        "gatekeeper state ready"
    );

    let metrics_listener = tokio::net::TcpListener::bind(config.metrics_bind)
        .await
        .with_context(|| format!("bind metrics listener {}", config.metrics_bind))?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        metrics_listener,
        std::future::pending(),
    ));

    let internal_task = if config.internal.enabled {
        let internal_addr = config.internal.bind_addr;
        let internal_app = build_internal_router(state.clone());
        Some(tokio::spawn(async move {
            match tokio::net::TcpListener::bind(internal_addr).await {
                Ok(listener) => {
                    tracing::info!(%internal_addr, "internal listener ready");
                    if let Err(err) = axum::serve(listener, internal_app.into_make_service()).await
                    {
                        tracing::warn!(error = %err, "internal listener stopped");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to bind internal listener");
                }
            }
        }))
    } else {
        None
    };

    let reconcile_task = if config.reconcile_interval.is_zero() {
        None
    } else {
        Some(tokio::spawn(run_reconciliation_loop(
            state.workflow.clone(),
            config.reconcile_interval,
        )))
    };

    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "gatekeeper listening");
    axum::serve(listener, build_router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    metrics_task.abort();
    let _ = metrics_task.await;
    for task in [internal_task, reconcile_task].into_iter().flatten() {
        task.abort();
        let _ = task.await;
    }
    Ok(())
}

async fn build_state(config: &GatekeeperConfig) -> anyhow::Result<AppState> {
    let store: SharedStore = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            Arc::new(
                PostgresStore::connect(pg)
                    .await
                    .context("connect postgres store")?,
            )
        }
    };

    let evaluator = config.evaluator()?;
    let sessions = SessionIssuer::new(
        &config.session.secret,
        &config.session.issuer,
        config.session.ttl,
    );
    Ok(AppState::new(
        store,
        evaluator,
        sessions,
        &config.initial_admins,
        config.internal.token.clone(),
    ))
}
