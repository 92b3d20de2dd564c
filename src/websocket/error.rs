//! Error types for the WebSocket proxy.

use thiserror::Error;

/// Errors raised while proxying a WebSocket session.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Upstream connect or handshake failed. Not retried here.
    #[error("upstream dial to {uri} failed: {reason}")]
    UpstreamDial { uri: String, reason: String },

    /// Administrative close requested for an id the registry does not track.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Mid-session I/O failure on either connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream handshake request could not be built.
    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),

    /// A raw frame surfaced from the transport where only messages are expected.
    #[error("unexpected raw frame from transport")]
    UnexpectedFrame,
}

impl From<axum::Error> for ProxyError {
    fn from(err: axum::Error) -> Self {
        ProxyError::Transport(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ProxyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ProxyError::Transport(err.to_string())
    }
}
