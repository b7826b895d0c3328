//! StreamRaft library: leader-elected video replicas and the gateway that
//! routes client traffic to whichever replica currently leads.
//!
//! The replica node (`src/main.rs`) runs a [`cluster::ReplicaState`] with its
//! election task and serves the video API from [`server`]. The gateway
//! (`src/bin/streamraft_gateway.rs`) discovers the leader on every request
//! and proxies to it; see [`gateway`].

use std::sync::Arc;

pub mod cluster;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod queue;
pub mod server;
pub mod storage;
pub mod thumbnail;

use crate::cluster::ReplicaState;
use crate::config::Config;
use crate::queue::MessageQueue;
use crate::storage::backend::ObjectStore;

/// Shared replica-node state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Node configuration.
    pub config: Config,
    /// This process's election state and video catalogue.
    pub replica: Arc<ReplicaState>,
    /// Where uploaded videos and thumbnails live.
    pub store: Arc<dyn ObjectStore>,
    /// Upload notifications for background workers.
    pub queue: Arc<dyn MessageQueue>,
}

impl AppState {
    /// Bucket uploads are written to.
    pub fn bucket(&self) -> &str {
        &self.config.storage.bucket
    }
}
