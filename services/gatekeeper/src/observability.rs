//! Observability wiring for the gatekeeper service.
//!
//! # Purpose
//! Initializes structured logging, optional OTLP trace export, W3C trace
//! context propagation, and the Prometheus `/metrics` listener.
//!
//! # Notes
//! - `RUST_LOG` controls the log filter; the default is `info`.
//! - OTLP export is enabled only when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//! - Initialization is guarded by `OnceLock` so repeated calls in tests are
//!   harmless.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::future::Future;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();
static PROPAGATOR_INIT: OnceLock<()> = OnceLock::new();

/// Install the tracing subscriber and metrics recorder once per process.
pub fn init_observability(service_name: &str) -> PrometheusHandle {
    TRACING_INIT.get_or_init(|| {
        install_propagator();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false));
        match build_tracer_provider(service_name) {
            Some(provider) => {
                let tracer = provider.tracer(service_name.to_string());
                global::set_tracer_provider(provider);
                let _ = registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });
    install_metrics_recorder()
}

fn install_propagator() {
    PROPAGATOR_INIT.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());
    });
}

fn build_tracer_provider(service_name: &str) -> Option<SdkTracerProvider> {
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .ok()?;
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name))
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

fn resource_attributes(service_name: &str) -> Vec<KeyValue> {
    let mut attrs = vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ];
    if let Ok(value) =
        std::env::var("GATEKEEPER_INSTANCE_ID").or_else(|_| std::env::var("HOSTNAME"))
    {
        attrs.push(KeyValue::new("service.instance.id", value));
    }
    if let Ok(value) = std::env::var("DEPLOYMENT_ENVIRONMENT") {
        attrs.push(KeyValue::new("deployment.environment", value));
    }
    attrs
}

/// Extract the caller's W3C trace context so request spans join its trace.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|prop| prop.extract(&HeaderMapExtractor(headers)))
}

struct HeaderMapExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Serve `/metrics` on `listener` until `shutdown` resolves.
pub async fn serve_metrics<F>(
    handle: PrometheusHandle,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    );
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

fn install_metrics_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(err) => {
                // Another recorder already owns the global slot.
                tracing::warn!(error = %err, "metrics recorder not installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::ScopedEnv;
    use opentelemetry::trace::{TraceContextExt, TraceId};
    use serial_test::serial;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn attribute(attrs: &[KeyValue], key: &str) -> Option<String> {
        attrs
            .iter()
            .find(|attr| attr.key.as_str() == key)
            .map(|attr| attr.value.to_string())
    }

    #[test]
    #[serial]
    fn resource_attributes_capture_env() {
        let _env = ScopedEnv::new()
            .set("GATEKEEPER_INSTANCE_ID", "gk-1")
            .set("DEPLOYMENT_ENVIRONMENT", "staging");

        let attrs = resource_attributes("gatekeeper");
        assert_eq!(attribute(&attrs, "service.name").as_deref(), Some("gatekeeper"));
        assert_eq!(attribute(&attrs, "service.instance.id").as_deref(), Some("gk-1"));
        assert_eq!(
            attribute(&attrs, "deployment.environment").as_deref(),
            Some("staging")
        );
        assert!(attribute(&attrs, "service.version").is_some());
    }

    #[test]
    #[serial]
    fn resource_attributes_fall_back_to_hostname() {
        let _env = ScopedEnv::new()
            .unset("GATEKEEPER_INSTANCE_ID")
            .set("HOSTNAME", "host-1");
        let attrs = resource_attributes("gatekeeper");
        assert_eq!(attribute(&attrs, "service.instance.id").as_deref(), Some("host-1"));
    }

    #[test]
    fn trace_context_extracts_span_context() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("traceparent", TRACEPARENT.parse().expect("header"));
        let context = trace_context_from_headers(&headers);
        let span = context.span();
        let span_ctx = span.span_context();
        assert!(span_ctx.is_valid());
        assert_eq!(
            span_ctx.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").expect("trace id")
        );
    }

    #[test]
    fn header_extractor_lists_keys() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert("traceparent", TRACEPARENT.parse().expect("header"));
        headers.insert("tracestate", "congo=t61rcWkgMzE".parse().expect("header"));
        let extractor = HeaderMapExtractor(&headers);
        assert_eq!(extractor.get("traceparent"), Some(TRACEPARENT));
        let keys = extractor.keys();
        assert!(keys.contains(&"traceparent"));
        assert!(keys.contains(&"tracestate"));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[serial]
    async fn serve_metrics_renders_counters() {
        let handle = init_observability("gatekeeper-metrics-test");
        let again = init_observability("gatekeeper-metrics-test");
        let _ = again.render();
        metrics::counter!("gatekeeper_guard_decisions_total", "decision" => "allow").increment(1);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_metrics(handle, listener, async move {
            let _ = shutdown_rx.await;
        }));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .expect("client");
        let body = client
            .get(format!("http://{addr}/metrics"))
            .send()
            .await
            .expect("GET /metrics")
            .error_for_status()
            .expect("status")
            .text()
            .await
            .expect("body");
        assert!(body.contains("gatekeeper_guard_decisions_total"));

        let _ = shutdown_tx.send(());
        let _ = tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("server shutdown");
    }
}
