//! HTTP handlers for the replica node's video API.

pub mod videos;
