//! Forwarding client requests to the current leader.
//!
//! Every request triggers a fresh discovery pass; there is no leader
//! cache and no retry. Bodies are streamed in both directions.

use std::time::Duration;

use ::metrics::counter;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::discovery::LeaderDiscovery;
use crate::errors::ClusterError;
use crate::metrics::PROXY_REQUESTS_TOTAL;

pub struct RequestRouter {
    client: reqwest::Client,
    discovery: LeaderDiscovery,
    node_urls: Vec<String>,
    timeout: Duration,
}

impl RequestRouter {
    pub fn new(
        client: reqwest::Client,
        discovery: LeaderDiscovery,
        node_urls: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            discovery,
            node_urls,
            timeout,
        }
    }

    /// Relay `req` to the leader and its answer back. Failures become
    /// `503` (no leader), `500` (request could not be built) or `502`
    /// (leader unreachable mid-request).
    pub async fn route(&self, req: Request<Body>) -> Response {
        let response = match self.forward(req).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Routing failed: {}", e.message());
                e.into_response()
            }
        };
        counter!(PROXY_REQUESTS_TOTAL, "status" => response.status().as_u16().to_string())
            .increment(1);
        response
    }

    async fn forward(&self, req: Request<Body>) -> Result<Response, ClusterError> {
        let leader = self.discovery.discover_leader(&self.node_urls).await?;

        let (parts, body) = req.into_parts();
        let mut target = format!("{}{}", leader.url, parts.uri.path());
        if let Some(query) = parts.uri.query() {
            target.push('?');
            target.push_str(query);
        }
        debug!("Proxying {} {} to {}", parts.method, parts.uri, target);

        // The outbound request carries the leader's authority.
        let mut headers = parts.headers;
        headers.remove(header::HOST);

        let outbound = self
            .client
            .request(parts.method, &target)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .timeout(self.timeout)
            .build()
            .map_err(|e| ClusterError::ProxyConstruction(e.to_string()))?;

        let upstream = self
            .client
            .execute(outbound)
            .await
            .map_err(|e| ClusterError::ProxyTransport(e.to_string()))?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                headers.append(name, value.clone());
            }
        }
        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ClusterError::ProxyConstruction(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testutil::{dead_url, fake_node, spawn_node, Hits};
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::{get, post};

    fn router_for(node_urls: Vec<String>) -> RequestRouter {
        let client = reqwest::Client::new();
        RequestRouter::new(
            client.clone(),
            LeaderDiscovery::new(client, Duration::from_secs(5)),
            node_urls,
            Duration::from_secs(30),
        )
    }

    /// A leader whose `/upload` echoes what it received.
    fn echoing_leader(hits: Hits) -> axum::Router {
        fake_node("node-1", true, hits)
            .route(
                "/upload",
                post(|headers: HeaderMap, body: axum::body::Bytes| async move {
                    let mut resp = Response::builder()
                        .status(StatusCode::CREATED)
                        .header("x-node", "node-1")
                        .header("set-cookie", "a=1")
                        .header("set-cookie", "b=2")
                        .header(
                            "x-seen-content-type",
                            headers
                                .get("content-type")
                                .cloned()
                                .unwrap_or_else(|| "none".parse().unwrap()),
                        );
                    let tags: Vec<String> = headers
                        .get_all("x-tag")
                        .iter()
                        .map(|v| v.to_str().unwrap().to_string())
                        .collect();
                    resp = resp.header("x-seen-tags", tags.join(","));
                    resp.body(Body::from(body)).unwrap()
                }),
            )
            .route(
                "/videos",
                get(|uri: Uri| async move { uri.to_string() }),
            )
    }

    #[tokio::test]
    async fn test_upload_is_relayed_verbatim() {
        let follower = spawn_node(fake_node("node-2", false, Hits::default())).await;
        let leader = spawn_node(echoing_leader(Hits::default())).await;
        let router = router_for(vec![follower, leader]);

        let payload = "--xyz\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.mp4\"\r\n\r\nDATA\r\n--xyz--\r\n";
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", "multipart/form-data; boundary=xyz")
            .header("x-tag", "one")
            .header("x-tag", "two")
            .body(Body::from(payload))
            .unwrap();

        let resp = router.route(req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()["x-node"], "node-1");
        assert_eq!(
            resp.headers()["x-seen-content-type"],
            "multipart/form-data; boundary=xyz"
        );
        assert_eq!(resp.headers()["x-seen-tags"], "one,two");
        let cookies: Vec<_> = resp.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, payload.as_bytes());
    }

    #[tokio::test]
    async fn test_path_and_query_are_kept() {
        let leader = spawn_node(echoing_leader(Hits::default())).await;
        let router = router_for(vec![leader]);
        let req = Request::builder()
            .uri("/videos?limit=5&tag=a%20b")
            .body(Body::empty())
            .unwrap();
        let resp = router.route(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"/videos?limit=5&tag=a%20b");
    }

    #[tokio::test]
    async fn test_leader_status_codes_are_relayed() {
        let leader = spawn_node(echoing_leader(Hits::default())).await;
        let router = router_for(vec![leader]);
        let req = Request::builder()
            .uri("/does-not-exist")
            .body(Body::empty())
            .unwrap();
        assert_eq!(router.route(req).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_all_nodes_down_is_503() {
        let router = router_for(vec![dead_url().await, dead_url().await]);
        let req = Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from("x"))
            .unwrap();
        let resp = router.route(req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("No leader available"));
    }

    #[tokio::test]
    async fn test_proxy_timeout_is_502() {
        let slow = spawn_node(fake_node("node-1", true, Hits::default()).route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;
        let client = reqwest::Client::new();
        let router = RequestRouter::new(
            client.clone(),
            LeaderDiscovery::new(client, Duration::from_secs(5)),
            vec![slow],
            Duration::from_millis(100),
        );

        let req = Request::builder().uri("/slow").body(Body::empty()).unwrap();
        let resp = router.route(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).starts_with("Proxy request failed:"));
    }
}
