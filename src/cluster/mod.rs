//! Leader election on each replica.
//!
//! [`replica::ReplicaState`] holds the election record and the
//! leadership-gated video catalogue, [`election::ElectionLoop`] ticks it,
//! and [`status`] defines the records replicas and the gateway exchange.

pub mod election;
pub mod replica;
pub mod status;

pub use election::{ElectionHandle, ElectionLoop, ElectionTiming};
pub use replica::{ReplicaState, Role, VideoMetadata};
pub use status::{ClusterStatus, NodeHealth, NodeStatus, RaftStatus};
