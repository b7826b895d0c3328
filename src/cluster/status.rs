//! Wire records exchanged between replicas and the gateway.
//!
//! Replicas produce [`RaftStatus`]. The gateway decodes only `id` and
//! `is_leader` from it; `status` and `url` on [`NodeStatus`] are always
//! filled in by whoever made the request, never read off the wire.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status record served by a replica on `GET /raft/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RaftStatus {
    pub id: String,
    pub is_leader: bool,
    /// `follower`, `candidate` or `leader`.
    pub state: String,
    pub term: u64,
    pub peers: Vec<String>,
}

/// The subset of a replica's status the gateway trusts.
///
/// Absent fields decode to their zero values, so `{}` is a valid (if
/// unhelpful) follower record.
#[derive(Debug, Default, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    id: String,
    #[serde(default)]
    is_leader: bool,
}

/// Health classification assigned by the gateway after polling a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeHealth {
    /// Responded with a decodable status record.
    Healthy,
    /// Responded, but the body could not be decoded.
    Unhealthy,
    /// Could not be reached.
    Down,
}

/// A replica as seen by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: String,
    pub is_leader: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeHealth>,
    pub url: String,
}

impl NodeStatus {
    /// Decode a replica's status body, stamping `url` from the caller's context.
    pub fn decode(body: &[u8], url: &str) -> serde_json::Result<Self> {
        let payload: StatusPayload = serde_json::from_slice(body)?;
        Ok(Self {
            id: payload.id,
            is_leader: payload.is_leader,
            status: None,
            url: url.to_string(),
        })
    }

    /// Placeholder entry for a node that produced no usable record.
    pub fn unreachable(url: &str, health: NodeHealth) -> Self {
        Self {
            id: String::new(),
            is_leader: false,
            status: Some(health),
            url: url.to_string(),
        }
    }

    pub fn with_health(mut self, health: NodeHealth) -> Self {
        self.status = Some(health);
        self
    }
}

/// Aggregated view served on the gateway's `GET /cluster/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub leader: Option<NodeStatus>,
    pub followers: Vec<NodeStatus>,
    pub healthy: bool,
}
