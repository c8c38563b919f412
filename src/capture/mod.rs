//! Upstream Capture Pipeline
//!
//! raw frame → [`decode`] → [`StrikeExtractor`] → [`CaptureSupervisor`] → hub
//!
//! The upstream is abstracted behind [`CaptureSource`]; [`WebSocketSource`]
//! is the direct client used in production.

mod decode;
mod error;
mod extract;
mod source;
mod supervisor;
mod types;

pub use decode::decode;
pub use error::CaptureError;
pub use extract::{extract, Rejected, StrikeExtractor};
pub use source::{
    CaptureEvent, CaptureSession, CaptureSource, WebSocketSource, WebSocketSourceConfig,
};
pub use supervisor::{CaptureStats, CaptureStatsSnapshot, CaptureSupervisor, SupervisorConfig};
pub use types::{SessionState, StrikeEvent};
