//! Axum router for the replica node.
//!
//! The [`app`] function wires the election status endpoint, health and
//! metrics endpoints and the video API to their handlers and returns a
//! ready-to-serve [`axum::Router`].

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    routing::post,
    Json, Router,
};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::cluster::{RaftStatus, VideoMetadata};
use crate::errors::generate_request_id;
use crate::handlers::videos;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the replica node API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "StreamRaft Node API",
        version = "0.1.0",
        description = "Leader-elected video replica"
    ),
    paths(
        raft_status,
        healthz,
        videos::upload_video,
        videos::list_videos,
        videos::create_video,
        videos::get_video,
        videos::update_video,
        videos::delete_video,
        videos::stream_video,
        videos::get_thumbnail,
    ),
    components(schemas(RaftStatus, VideoMetadata, videos::VideoUpdate)),
    tags(
        (name = "Raft", description = "Election status"),
        (name = "Health", description = "Health check endpoints"),
        (name = "Videos", description = "Video catalogue and content"),
    )
)]
struct ApiDoc;

/// Build the node [`Router`].
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/raft/status", get(raft_status))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/upload", post(videos::upload_video))
        .route("/videos", get(videos::list_videos).post(videos::create_video))
        .route(
            "/videos/:id",
            get(videos::get_video)
                .put(videos::update_video)
                .delete(videos::delete_video),
        )
        .route("/videos/:id/stream", get(videos::stream_video))
        .route("/videos/:id/thumbnail", get(videos::get_thumbnail))
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
        // Video uploads routinely exceed the default 2MB body limit.
        .layer(DefaultBodyLimit::disable())
}

// -- Serving and shutdown -----------------------------------------------------

/// Serve `app` until SIGINT/SIGTERM or until `token` is cancelled.
///
/// A signal cancels `token`, so background tasks holding a child of it
/// stop alongside the listener. In-flight requests get `drain_timeout` to
/// finish before the server is dropped.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    token: CancellationToken,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let signal_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown_signal() => signal_token.cancel(),
            _ = signal_token.cancelled() => {}
        }
    });

    let stop = token.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .into_future();
    let deadline = async {
        token.cancelled().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => warn!(
            "In-flight requests still running after {:?}, exiting anyway",
            drain_timeout
        ),
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

// -- Middleware and local handlers ---------------------------------------------

/// Tag every response with an `x-request-id`, keeping one supplied by the
/// caller.
pub(crate) async fn request_id_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let incoming = req.headers().get("x-request-id").cloned();
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if headers.contains_key("x-request-id") {
        return response;
    }
    let value = incoming.or_else(|| HeaderValue::from_str(&generate_request_id()).ok());
    if let Some(value) = value {
        headers.insert("x-request-id", value);
    }
    response
}

/// `GET /raft/status` -- snapshot of this replica's election state.
#[utoipa::path(
    get,
    path = "/raft/status",
    tag = "Raft",
    operation_id = "RaftStatus",
    responses((status = 200, description = "Election state", body = RaftStatus))
)]
async fn raft_status(State(state): State<Arc<AppState>>) -> Json<RaftStatus> {
    Json(state.replica.get_status().await)
}

/// `GET /healthz` -- `200 OK`, empty body.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Health",
    operation_id = "HealthCheck",
    responses((status = 200, description = "Process is up"))
)]
async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
