//! # Strike Relay
//!
//! Relays real-time lightning strikes from one upstream feed to many
//! WebSocket subscribers.
//!
//! ## Features
//!
//! - **Upstream decoding**: Expands the feed's LZW-style compressed frames
//! - **Supervised capture**: One upstream session at a time, restarted after failure
//! - **Bounded history**: Most recent strikes kept in memory, optionally sent on connect
//! - **Fan-out**: Every subscriber gets every strike in ingestion order; slow ones are dropped
//!
//! ## Modules
//!
//! - [`capture`]: Decoder, strike extraction, upstream sources and the supervisor
//! - [`websocket`]: Relay hub and subscriber connections
//! - [`api`]: HTTP server with Axum
//! - [`config`]: Layered configuration
//! - [`shutdown`]: Signal handling and bounded shutdown
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strike_relay::capture::{CaptureSupervisor, SupervisorConfig, WebSocketSource, WebSocketSourceConfig};
//! use strike_relay::websocket::{HubConfig, RelayHub};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Arc::new(RelayHub::new(HubConfig::default()));
//!     let source = Arc::new(WebSocketSource::new(WebSocketSourceConfig::default()));
//!
//!     let shutdown = CancellationToken::new();
//!     let supervisor = CaptureSupervisor::new(source, Arc::clone(&hub), SupervisorConfig::default());
//!     let handle = supervisor.start(shutdown.clone());
//!
//!     // ... serve subscribers, then:
//!     shutdown.cancel();
//!     let _ = handle.await;
//! }
//! ```

pub mod api;
pub mod capture;
pub mod config;
pub mod shutdown;
pub mod websocket;

// Re-export top-level types for convenience
pub use capture::{
    decode, extract, CaptureError, CaptureEvent, CaptureSession, CaptureSource, CaptureSupervisor,
    Rejected, SessionState, StrikeEvent, StrikeExtractor, SupervisorConfig, WebSocketSource,
};

pub use websocket::{HubConfig, HubError, RelayHub, ServerMessage};

pub use api::{bind, build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig};

pub use shutdown::{graceful_shutdown, wait_for_shutdown_signal, ShutdownOutcome};
