//! Prometheus metrics for StreamRaft.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler. Both the replica
//! node and the gateway use this module.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "streamraft_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "streamraft_http_request_duration_seconds";

/// Current election term (gauge).
pub const ELECTION_TERM: &str = "streamraft_election_term";

/// Current role (gauge): 0 follower, 1 candidate, 2 leader.
pub const ELECTION_ROLE: &str = "streamraft_election_role";

/// Candidate to Leader transitions (counter).
pub const LEADER_TRANSITIONS_TOTAL: &str = "streamraft_leader_transitions_total";

/// Leader discovery calls (counter). Labels: outcome (`found` | `no_leader`).
pub const DISCOVERY_TOTAL: &str = "streamraft_discovery_total";

/// Requests routed to the leader (counter). Labels: status.
pub const PROXY_REQUESTS_TOTAL: &str = "streamraft_proxy_requests_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Install the global Prometheus metrics recorder. Idempotent, so tests
/// may call it repeatedly. Fails only if another recorder is already
/// installed.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// [`init_metrics`].
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(ELECTION_TERM, "Current election term");
    describe_gauge!(
        ELECTION_ROLE,
        "Current role (0 follower, 1 candidate, 2 leader)"
    );
    describe_counter!(LEADER_TRANSITIONS_TOTAL, "Transitions into the leader role");
    describe_counter!(DISCOVERY_TOTAL, "Leader discovery calls by outcome");
    describe_counter!(PROXY_REQUESTS_TOTAL, "Requests routed to the leader by status");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to a route template for metric labels, so
/// video ids do not create one series each.
///
/// - `/videos/1700000000_clip` -> `/videos/{id}`
/// - `/videos/1700000000_clip/stream` -> `/videos/{id}/stream`
/// - `/raft/anything` -> `/raft/{rest}` (except `/raft/status`)
/// - unknown paths -> `/{other}`
pub(crate) fn normalize_path(path: &str) -> String {
    match path {
        "/" | "/health" | "/healthz" | "/metrics" | "/openapi.json" | "/cluster/status"
        | "/upload" | "/videos" | "/raft/status" => return path.to_string(),
        _ => {}
    }

    let segments: Vec<&str> = path
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        ["videos", _] => "/videos/{id}".to_string(),
        ["videos", _, "stream"] => "/videos/{id}/stream".to_string(),
        ["videos", _, "thumbnail"] => "/videos/{id}/thumbnail".to_string(),
        ["raft", ..] => "/raft/{rest}".to_string(),
        [] => "/".to_string(),
        _ => "/{other}".to_string(),
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_fixed_routes() {
        for p in [
            "/",
            "/health",
            "/healthz",
            "/metrics",
            "/cluster/status",
            "/upload",
            "/videos",
            "/raft/status",
        ] {
            assert_eq!(normalize_path(p), p);
        }
    }

    #[test]
    fn test_normalize_path_video_routes() {
        assert_eq!(normalize_path("/videos/1700000000_clip"), "/videos/{id}");
        assert_eq!(
            normalize_path("/videos/1700000000_clip/stream"),
            "/videos/{id}/stream"
        );
        assert_eq!(
            normalize_path("/videos/1700000000_clip/thumbnail"),
            "/videos/{id}/thumbnail"
        );
    }

    #[test]
    fn test_normalize_path_other() {
        assert_eq!(normalize_path("/raft/vote"), "/raft/{rest}");
        assert_eq!(normalize_path("/favicon.ico"), "/{other}");
        assert_eq!(normalize_path("/videos/a/b/c"), "/{other}");
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        let first = init_metrics().unwrap() as *const PrometheusHandle;
        let second = init_metrics().unwrap() as *const PrometheusHandle;
        assert_eq!(first, second);
    }
}
