//! Shared error types for the REST and push transports.

use thiserror::Error;

/// Error returned by request/response calls to the node's REST API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Error raised by a publish/subscribe transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The handshake with the node did not complete.
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("transport is not connected")]
    NotConnected,
    /// A frame could not be decoded, or the node answered with an ERROR frame.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("send failed: {0}")]
    Send(String),
}

impl TransportError {
    /// Whether the error means the underlying session is gone, as opposed to
    /// a single bad frame.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            TransportError::Connect(_)
                | TransportError::NotConnected
                | TransportError::Closed(_)
                | TransportError::Send(_)
        )
    }
}

/// Attempt to pull a human readable message out of a node error body.
/// Spring-style nodes answer with `{"message": ..., "status": ...}`.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;
    let message = parsed.get("message")?.as_str()?.trim();
    if message.is_empty() {
        return None;
    }
    Some(message.to_string())
}
