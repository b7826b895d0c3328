//! Per-replica election state and the leadership-gated video catalogue.
//!
//! One [`ReplicaState`] exists per node process. The election task is the
//! only writer of the role, term, vote and heartbeat fields; HTTP handlers
//! read them and mutate the video map, which is only writable while the
//! replica is the leader. Everything sits behind a single
//! `tokio::sync::RwLock`, whose FIFO fairness keeps status reads from being
//! starved by the tick task.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ::metrics::{counter, gauge};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::info;
use utoipa::ToSchema;

use super::status::RaftStatus;
use crate::errors::ClusterError;
use crate::metrics::{ELECTION_ROLE, ELECTION_TERM, LEADER_TRANSITIONS_TOTAL};

/// Election role of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl Role {
    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        }
    }

    /// Numeric value exported on the role gauge.
    pub fn gauge_value(&self) -> f64 {
        match self {
            Role::Follower => 0.0,
            Role::Candidate => 1.0,
            Role::Leader => 2.0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata record for an uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub bucket: String,
    pub object: String,
    pub thumbnail_url: String,
    pub size: u64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub resolutions: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    role: Role,
    term: u64,
    voted_for: Option<String>,
    last_heartbeat: Instant,
    peers: Vec<String>,
    videos: HashMap<String, VideoMetadata>,
}

/// In-memory election record of one replica.
pub struct ReplicaState {
    id: String,
    /// Identity that wins an election without contacting peers.
    bootstrap_id: String,
    inner: RwLock<Inner>,
}

impl ReplicaState {
    /// Create a follower at term 0 whose heartbeat clock starts now.
    pub fn new(id: impl Into<String>, peers: Vec<String>, bootstrap_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bootstrap_id: bootstrap_id.into(),
            inner: RwLock::new(Inner {
                role: Role::Follower,
                term: 0,
                voted_for: None,
                last_heartbeat: Instant::now(),
                peers,
                videos: HashMap::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn role(&self) -> Role {
        self.inner.read().await.role
    }

    pub async fn term(&self) -> u64 {
        self.inner.read().await.term
    }

    pub async fn voted_for(&self) -> Option<String> {
        self.inner.read().await.voted_for.clone()
    }

    /// Point-in-time check of `role == Leader`.
    pub async fn is_leader(&self) -> bool {
        self.inner.read().await.role == Role::Leader
    }

    /// Snapshot of the election state as served on `/raft/status`.
    pub async fn get_status(&self) -> RaftStatus {
        let inner = self.inner.read().await;
        RaftStatus {
            id: self.id.clone(),
            is_leader: inner.role == Role::Leader,
            state: inner.role.as_str().to_string(),
            term: inner.term,
            peers: inner.peers.clone(),
        }
    }

    /// Advance the state machine by one tick. Returns the role after the tick.
    ///
    /// A follower whose heartbeat is older than `heartbeat_timeout` becomes a
    /// candidate and stands for election in the same tick. A candidate wins
    /// when it has no peers or carries the bootstrap identity; otherwise it
    /// stays a candidate. A leader only refreshes its own heartbeat clock.
    /// A replica that can win alone therefore goes straight from follower to
    /// leader and never reports `candidate` on `/raft/status`.
    pub(crate) async fn tick(&self, heartbeat_timeout: Duration) -> Role {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        let role = inner.role;

        match role {
            Role::Follower => {
                if now.duration_since(inner.last_heartbeat) > heartbeat_timeout {
                    self.become_candidate(&mut inner);
                    self.start_election(&mut inner);
                }
            }
            Role::Candidate => self.start_election(&mut inner),
            Role::Leader => inner.last_heartbeat = now,
        }

        gauge!(ELECTION_TERM).set(inner.term as f64);
        gauge!(ELECTION_ROLE).set(inner.role.gauge_value());
        inner.role
    }

    fn become_candidate(&self, inner: &mut Inner) {
        inner.role = Role::Candidate;
        inner.term += 1;
        inner.voted_for = Some(self.id.clone());
        info!("Node {} became candidate for term {}", self.id, inner.term);
    }

    // No vote requests are sent; see DESIGN.md on the bootstrap election.
    fn start_election(&self, inner: &mut Inner) {
        if inner.peers.is_empty() || self.id == self.bootstrap_id {
            inner.role = Role::Leader;
            inner.last_heartbeat = Instant::now();
            counter!(LEADER_TRANSITIONS_TOTAL).increment(1);
            info!("Node {} became LEADER for term {}", self.id, inner.term);
        }
    }

    // -- Video catalogue ------------------------------------------------------

    /// Insert or overwrite `meta`. Fails with `NotLeader` unless this replica
    /// is the leader at the moment the write lock is held.
    pub async fn store_video_metadata(&self, meta: VideoMetadata) -> Result<(), ClusterError> {
        let mut inner = self.inner.write().await;
        if inner.role != Role::Leader {
            return Err(ClusterError::NotLeader);
        }
        inner.videos.insert(meta.id.clone(), meta);
        Ok(())
    }

    /// Apply `update` to an existing record under the same leadership gate.
    pub async fn update_video_metadata<F>(
        &self,
        id: &str,
        update: F,
    ) -> Result<VideoMetadata, ClusterError>
    where
        F: FnOnce(&mut VideoMetadata),
    {
        let mut inner = self.inner.write().await;
        if inner.role != Role::Leader {
            return Err(ClusterError::NotLeader);
        }
        let meta = inner
            .videos
            .get_mut(id)
            .ok_or_else(|| ClusterError::NotFound { id: id.to_string() })?;
        update(meta);
        Ok(meta.clone())
    }

    /// Remove a record under the leadership gate, returning it.
    pub async fn delete_video_metadata(&self, id: &str) -> Result<VideoMetadata, ClusterError> {
        let mut inner = self.inner.write().await;
        if inner.role != Role::Leader {
            return Err(ClusterError::NotLeader);
        }
        inner
            .videos
            .remove(id)
            .ok_or_else(|| ClusterError::NotFound { id: id.to_string() })
    }

    pub async fn get_video_metadata(&self, id: &str) -> Result<VideoMetadata, ClusterError> {
        self.inner
            .read()
            .await
            .videos
            .get(id)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound { id: id.to_string() })
    }

    /// All records, in no particular order.
    pub async fn list_videos(&self) -> Vec<VideoMetadata> {
        self.inner.read().await.videos.values().cloned().collect()
    }
}

#[cfg(test)]
impl ReplicaState {
    /// Jump straight to `role` without waiting for the election timer.
    pub(crate) async fn force_role(&self, role: Role) {
        self.inner.write().await.role = role;
    }
}

#[cfg(test)]
pub(crate) fn sample_video(id: &str) -> VideoMetadata {
    VideoMetadata {
        id: id.to_string(),
        title: format!("title-{id}"),
        bucket: "videos".to_string(),
        object: format!("1700000000000000000_{id}.mp4"),
        thumbnail_url: format!("/videos/{id}/thumbnail"),
        size: 42,
        content_type: "video/mp4".to_string(),
        uploaded_at: Utc::now(),
        resolutions: vec!["original".to_string()],
    }
}
