//! Finding the current leader by polling replicas in configured order.

use std::time::Duration;

use ::metrics::counter;
use axum::http::StatusCode;
use tracing::{debug, warn};

use crate::cluster::NodeStatus;
use crate::errors::ClusterError;
use crate::metrics::DISCOVERY_TOTAL;

/// Outcome of one `GET {url}/raft/status`.
#[derive(Debug)]
pub(crate) enum Poll {
    /// Nothing came back: connect failure or timeout.
    Down(String),
    /// A response arrived. `record` is `None` when the body could not be
    /// read or decoded.
    Responded {
        status: StatusCode,
        record: Option<NodeStatus>,
    },
}

/// Poll one replica's status endpoint.
pub(crate) async fn poll_status(client: &reqwest::Client, url: &str, timeout: Duration) -> Poll {
    let resp = match client
        .get(format!("{url}/raft/status"))
        .timeout(timeout)
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(e) => return Poll::Down(e.to_string()),
    };

    let status = resp.status();
    let record = match resp.bytes().await {
        Ok(body) => match NodeStatus::decode(&body, url) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Undecodable status from {}: {}", url, e);
                None
            }
        },
        Err(e) => {
            debug!("Failed to read status body from {}: {}", url, e);
            None
        }
    };
    Poll::Responded { status, record }
}

/// Sequential leader lookup. Nothing is cached: every call polls again
/// from the first URL.
#[derive(Clone)]
pub struct LeaderDiscovery {
    client: reqwest::Client,
    timeout: Duration,
}

impl LeaderDiscovery {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Return the first replica in `node_urls` that reports leadership,
    /// with `url` set to the URL it was reached at. Replicas after it are
    /// not contacted.
    pub async fn discover_leader(&self, node_urls: &[String]) -> Result<NodeStatus, ClusterError> {
        for url in node_urls {
            match poll_status(&self.client, url, self.timeout).await {
                Poll::Down(e) => debug!("Skipping {}: {}", url, e),
                Poll::Responded { status, .. } if !status.is_success() => {
                    debug!("Skipping {}: status {}", url, status)
                }
                Poll::Responded { record: None, .. } => debug!("Skipping {}: bad status body", url),
                Poll::Responded {
                    record: Some(record),
                    ..
                } => {
                    if record.is_leader {
                        debug!("Leader is {} at {}", record.id, url);
                        counter!(DISCOVERY_TOTAL, "outcome" => "found").increment(1);
                        return Ok(record);
                    }
                }
            }
        }

        warn!("No leader among {} configured nodes", node_urls.len());
        counter!(DISCOVERY_TOTAL, "outcome" => "no_leader").increment(1);
        Err(ClusterError::NoLeader {
            attempted: node_urls.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testutil::{dead_url, fake_node, spawn_node, Hits};

    fn discovery() -> LeaderDiscovery {
        LeaderDiscovery::new(reqwest::Client::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_returns_first_leader_and_stops() {
        let a = Hits::default();
        let b = Hits::default();
        let c = Hits::default();
        let url_a = spawn_node(fake_node("node-a", false, a.clone())).await;
        let url_b = spawn_node(fake_node("node-b", true, b.clone())).await;
        let url_c = spawn_node(fake_node("node-c", true, c.clone())).await;

        let leader = discovery()
            .discover_leader(&[url_a, url_b.clone(), url_c])
            .await
            .unwrap();

        assert_eq!(leader.url, url_b);
        assert_eq!(leader.id, "node-b");
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(c.count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_nodes_are_skipped() {
        let b = Hits::default();
        let url_b = spawn_node(fake_node("node-b", true, b.clone())).await;
        let leader = discovery()
            .discover_leader(&[dead_url().await, url_b.clone(), dead_url().await])
            .await
            .unwrap();
        assert_eq!(leader.url, url_b);
    }

    #[tokio::test]
    async fn test_non_success_and_garbage_are_skipped() {
        use axum::routing::get;
        let erroring = axum::Router::new().route(
            "/raft/status",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"id":"x","is_leader":true}"#,
                )
            }),
        );
        let garbage =
            axum::Router::new().route("/raft/status", get(|| async { "<html>nope</html>" }));
        let urls = [spawn_node(erroring).await, spawn_node(garbage).await];

        let err = discovery().discover_leader(&urls).await.unwrap_err();
        match err {
            ClusterError::NoLeader { attempted } => assert_eq!(attempted, urls.to_vec()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_leader_lists_every_url() {
        let urls = vec![dead_url().await, dead_url().await];
        let err = discovery().discover_leader(&urls).await.unwrap_err();
        let msg = err.message();
        assert!(msg.starts_with("No leader available"));
        for url in &urls {
            assert!(msg.contains(url.as_str()));
        }
    }
}
