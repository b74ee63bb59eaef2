//! anthropic-relay - an authenticated callable relay for the Anthropic Messages API
//!
//! Verified callers post `system` and `messages`; the relay adds the API key, the model and the
//! token cap, forwards the call upstream and returns the upstream JSON untouched. Failures reach
//! the caller as one of two errors: `UNAUTHENTICATED` or `INTERNAL`.

use axum::Router;
use axum::routing::{get, post};
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod auth;
pub mod client;
pub mod credentials;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod upstream;

use client::{HttpClient, HyperClient, PoolConfig};
use credentials::{ParamSource, ProcessEnv};
use handlers::{claude_proxy, hello_world, test_claude_api};
use registry::Registry;
use upstream::Upstream;

/// The main application state: the upstream client and settings, and where callers and
/// credentials are looked up.
#[derive(Clone, Debug)]
pub struct AppState<T: HttpClient> {
    pub http_client: T,
    pub registry: Registry,
    pub upstream: Arc<Upstream>,
    /// Consulted before the registry's params when resolving the API key.
    pub env: Arc<dyn ParamSource>,
}

impl AppState<HyperClient> {
    /// Create a new AppState with the default Hyper client
    pub fn new(registry: Registry, upstream: Upstream, pool: PoolConfig) -> Self {
        let http_client = client::create_hyper_client(pool);
        Self::with_client(registry, upstream, http_client)
    }
}

impl<T: HttpClient> AppState<T> {
    /// Create a new AppState with a custom HTTP client (useful for testing)
    pub fn with_client(registry: Registry, upstream: Upstream, http_client: T) -> Self {
        Self {
            http_client,
            registry,
            upstream: Arc::new(upstream),
            env: Arc::new(ProcessEnv),
        }
    }

    /// Replace the environment the API key is first looked up in.
    pub fn with_env(mut self, env: impl ParamSource + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }
}

/// Build the main router for the relay
/// This creates routes for:
/// - `POST /claude_proxy` - the authenticated relay to the Messages API
/// - `POST /hello_world` - an unauthenticated echo, for liveness checks
/// - `GET /test_claude_api` - a fixed upstream probe, only when `diagnostics` is set
#[instrument(skip(state))]
pub fn build_router<T: HttpClient + Clone + Send + Sync + 'static>(
    state: AppState<T>,
    diagnostics: bool,
) -> Router {
    info!("Building router");
    let router = Router::new()
        .route("/claude_proxy", post(claude_proxy::<T>))
        .route("/hello_world", post(hello_world));

    let router = if diagnostics {
        info!("Diagnostics enabled, routing /test_claude_api");
        router.route("/test_claude_api", get(test_claude_api::<T>))
    } else {
        router
    };

    router.with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
///
/// `prefix` is prepended to every metric name; it must live for the whole program because the
/// Prometheus recorder is process-global.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}
