//! Cluster error types.
//!
//! Every variant maps to an HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so handlers on both the replica
//! node and the gateway can simply return `Err(ClusterError::NotLeader)`.
//! Bodies are plain text, one line, the way the front door has always
//! reported failures to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Errors surfaced by the election core, the video store, and the router.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Discovery polled every configured replica and none reported leadership.
    #[error("no leader found among nodes: {attempted:?}")]
    NoLeader { attempted: Vec<String> },

    /// A leadership-gated mutation reached a replica that is not the leader.
    #[error("Not the leader - please route through gateway")]
    NotLeader,

    /// Lookup of an unknown video identity.
    #[error("video not found: {id}")]
    NotFound { id: String },

    /// The outbound proxy request could not be built.
    #[error("Failed to create proxy request: {0}")]
    ProxyConstruction(String),

    /// The outbound proxy request failed in transit.
    #[error("Proxy request failed: {0}")]
    ProxyTransport(String),

    /// The client sent something we cannot act on.
    #[error("{0}")]
    InvalidRequest(String),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClusterError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClusterError::NoLeader { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ClusterError::NotLeader => StatusCode::SERVICE_UNAVAILABLE,
            ClusterError::NotFound { .. } => StatusCode::NOT_FOUND,
            ClusterError::ProxyConstruction(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ClusterError::ProxyTransport(_) => StatusCode::BAD_GATEWAY,
            ClusterError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ClusterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Discovery exhaustion is prefixed so callers
    /// can recognise it regardless of which URLs were attempted.
    pub fn message(&self) -> String {
        match self {
            ClusterError::NoLeader { .. } => format!("No leader available: {self}"),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = self.message();
        body.push('\n');

        (
            status,
            [
                ("content-type", "text/plain; charset=utf-8"),
                ("x-content-type-options", "nosniff"),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_16_upper_hex() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_status_mapping() {
        let no_leader = ClusterError::NoLeader { attempted: vec![] };
        assert_eq!(no_leader.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ClusterError::ProxyConstruction("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ClusterError::ProxyTransport("refused".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ClusterError::NotFound { id: "x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_no_leader_message_lists_attempted_urls() {
        let err = ClusterError::NoLeader {
            attempted: vec!["http://a".into(), "http://b".into()],
        };
        let msg = err.message();
        assert!(msg.starts_with("No leader available: "));
        assert!(msg.contains("http://a"));
        assert!(msg.contains("http://b"));
    }

    #[tokio::test]
    async fn test_into_response_plain_text_body() {
        let resp = ClusterError::ProxyTransport("connection refused".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text, "Proxy request failed: connection refused\n");
    }
}
