//! Cluster-wide health view for `GET /cluster/status`.

use std::time::Duration;

use tracing::debug;

use super::discovery::{poll_status, Poll};
use crate::cluster::{ClusterStatus, NodeHealth, NodeStatus};

/// Polls every replica and classifies each one. Unlike discovery this
/// never stops early, and the response status code is not consulted:
/// only whether a decodable record came back.
#[derive(Clone)]
pub struct ClusterStatusAggregator {
    client: reqwest::Client,
    timeout: Duration,
}

impl ClusterStatusAggregator {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub async fn get_cluster_status(&self, node_urls: &[String]) -> ClusterStatus {
        let mut leader: Option<NodeStatus> = None;
        let mut followers = Vec::with_capacity(node_urls.len());

        for url in node_urls {
            match poll_status(&self.client, url, self.timeout).await {
                Poll::Down(e) => {
                    debug!("{} is down: {}", url, e);
                    followers.push(NodeStatus::unreachable(url, NodeHealth::Down));
                }
                Poll::Responded { record: None, .. } => {
                    followers.push(NodeStatus::unreachable(url, NodeHealth::Unhealthy));
                }
                Poll::Responded {
                    record: Some(record),
                    ..
                } => {
                    let record = record.with_health(NodeHealth::Healthy);
                    // A second self-declared leader is listed, not promoted.
                    if record.is_leader && leader.is_none() {
                        leader = Some(record);
                    } else {
                        followers.push(record);
                    }
                }
            }
        }

        ClusterStatus {
            healthy: leader.is_some(),
            leader,
            followers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testutil::{dead_url, fake_node, spawn_node, Hits};
    use axum::routing::get;

    fn aggregator() -> ClusterStatusAggregator {
        ClusterStatusAggregator::new(reqwest::Client::new(), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_all_down() {
        let urls = vec![dead_url().await, dead_url().await, dead_url().await];
        let status = aggregator().get_cluster_status(&urls).await;

        assert!(status.leader.is_none());
        assert!(!status.healthy);
        assert_eq!(status.followers.len(), 3);
        for (node, url) in status.followers.iter().zip(&urls) {
            assert_eq!(node.status, Some(NodeHealth::Down));
            assert_eq!(&node.url, url);
        }
    }

    #[tokio::test]
    async fn test_one_leader_and_mixed_followers() {
        let hits = Hits::default();
        let leader_url = spawn_node(fake_node("node-1", true, hits.clone())).await;
        let follower_url = spawn_node(fake_node("node-2", false, hits.clone())).await;
        let garbage_url = spawn_node(
            axum::Router::new().route("/raft/status", get(|| async { "not json" })),
        )
        .await;
        let down_url = dead_url().await;

        let status = aggregator()
            .get_cluster_status(&[
                follower_url.clone(),
                leader_url.clone(),
                garbage_url.clone(),
                down_url.clone(),
            ])
            .await;

        assert!(status.healthy);
        let leader = status.leader.unwrap();
        assert_eq!(leader.id, "node-1");
        assert_eq!(leader.url, leader_url);
        assert_eq!(leader.status, Some(NodeHealth::Healthy));

        let classes: Vec<(String, Option<NodeHealth>)> = status
            .followers
            .iter()
            .map(|n| (n.url.clone(), n.status))
            .collect();
        assert_eq!(
            classes,
            vec![
                (follower_url, Some(NodeHealth::Healthy)),
                (garbage_url, Some(NodeHealth::Unhealthy)),
                (down_url, Some(NodeHealth::Down)),
            ]
        );
        // Every node was polled, including those after the leader.
        assert_eq!(hits.count(), 2);
    }

    #[tokio::test]
    async fn test_first_leader_wins() {
        let hits = Hits::default();
        let first = spawn_node(fake_node("node-1", true, hits.clone())).await;
        let second = spawn_node(fake_node("node-2", true, hits.clone())).await;
        let status = aggregator()
            .get_cluster_status(&[first.clone(), second.clone()])
            .await;
        assert_eq!(status.leader.unwrap().url, first);
        assert_eq!(status.followers.len(), 1);
        assert_eq!(status.followers[0].url, second);
    }
}
