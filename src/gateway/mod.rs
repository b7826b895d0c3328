//! The front door: leader discovery, cluster health and request routing.
//!
//! Clients talk only to the gateway. `GET /health`, `GET /cluster/status`
//! and `GET /metrics` are answered locally; the video API and everything
//! under `/raft/` is relayed to whichever replica currently leads.

pub mod aggregator;
pub mod discovery;
pub mod proxy;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cluster::ClusterStatus;
use crate::config::Config;
use crate::errors::ClusterError;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::server::request_id_middleware;
pub use aggregator::ClusterStatusAggregator;
pub use discovery::LeaderDiscovery;
pub use proxy::RequestRouter;

/// Shared gateway state. One `reqwest::Client` backs discovery,
/// aggregation and proxying.
pub struct GatewayState {
    pub node_urls: Vec<String>,
    pub aggregator: ClusterStatusAggregator,
    pub router: Arc<RequestRouter>,
}

impl GatewayState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        let gateway = &config.gateway;
        let node_urls = gateway.normalized_node_urls();
        if node_urls.is_empty() {
            anyhow::bail!("gateway.node_urls is empty");
        }
        info!("Monitoring nodes: {:?}", node_urls);

        let discovery = LeaderDiscovery::new(client.clone(), gateway.discovery_timeout());
        Ok(Self {
            aggregator: ClusterStatusAggregator::new(client.clone(), gateway.status_timeout()),
            router: Arc::new(RequestRouter::new(
                client,
                discovery,
                node_urls.clone(),
                gateway.proxy_timeout(),
            )),
            node_urls,
        })
    }
}

/// Build the gateway [`Router`].
pub fn app(state: Arc<GatewayState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cluster/status", get(cluster_status))
        .route("/metrics", get(metrics_handler))
        .route("/upload", post(proxy_to_leader))
        .route("/videos", get(proxy_to_leader).post(proxy_to_leader))
        .route(
            "/videos/:id",
            get(proxy_to_leader)
                .put(proxy_to_leader)
                .delete(proxy_to_leader),
        )
        .route("/videos/:id/stream", get(proxy_to_leader))
        .route("/videos/:id/thumbnail", get(proxy_to_leader))
        // The wildcard does not match an empty remainder.
        .route("/raft/", any(proxy_to_leader))
        .route("/raft/*rest", any(proxy_to_leader))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(cors_layer(cors_origins))
}

/// Browser access for the configured origins. `*` mirrors any origin,
/// since credentials are allowed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// `GET /health` -- liveness only.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// `GET /cluster/status` -- polled fresh on every call.
async fn cluster_status(State(state): State<Arc<GatewayState>>) -> Json<ClusterStatus> {
    Json(state.aggregator.get_cluster_status(&state.node_urls).await)
}

/// Relay to the leader. The work runs in its own task so a client
/// disconnect does not cut discovery or the upstream request short.
async fn proxy_to_leader(State(state): State<Arc<GatewayState>>, req: Request<Body>) -> Response {
    let router = state.router.clone();
    match tokio::spawn(async move { router.route(req).await }).await {
        Ok(response) => response,
        Err(e) => ClusterError::Internal(anyhow::anyhow!("routing task failed: {e}")).into_response(),
    }
}
