//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::capture::{CaptureStats, SessionState};
use crate::websocket::RelayHub;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay hub holding history and subscribers
    pub hub: Arc<RelayHub>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
    /// Cancelled when the process starts shutting down
    pub shutdown: CancellationToken,
    /// Capture session state, when a supervisor is running
    pub capture_state: Option<watch::Receiver<SessionState>>,
    /// Capture counters, when a supervisor is running
    pub capture_stats: Option<Arc<CaptureStats>>,
}

impl AppState {
    /// Create a new AppState without capture observability
    pub fn new(hub: Arc<RelayHub>, config: ApiConfig, shutdown: CancellationToken) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
            shutdown,
            capture_state: None,
            capture_stats: None,
        }
    }

    /// Attach the capture supervisor's state and counters
    pub fn with_capture(
        mut self,
        state: watch::Receiver<SessionState>,
        stats: Arc<CaptureStats>,
    ) -> Self {
        self.capture_state = Some(state);
        self.capture_stats = Some(stats);
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Current capture session state, if known
    pub fn capture_state(&self) -> Option<SessionState> {
        self.capture_state.as_ref().map(|rx| *rx.borrow())
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Outbound queue length per subscriber
    pub subscriber_buffer: usize,
    /// Upper bound on a single socket write
    pub write_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            subscriber_buffer: 256,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
