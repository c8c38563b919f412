//! Capture session errors
//!
//! Every variant ends the current session and schedules a restart.

use thiserror::Error;

/// Errors surfaced by a capture source or session
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Could not establish the upstream connection
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Connecting took longer than the configured timeout
    #[error("Connection timeout")]
    Timeout,

    /// Protocol-level failure on an established session
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The upstream stopped delivering events
    #[error("Stream ended unexpectedly")]
    StreamEnded,

    /// No frame arrived within the idle limit
    #[error("No upstream traffic for {0:?}")]
    Idle(std::time::Duration),
}

impl From<tokio_tungstenite::tungstenite::Error> for CaptureError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        CaptureError::WebSocket(err.to_string())
    }
}
