//! Data Transfer Objects
//!
//! Request and response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::capture::{CaptureStatsSnapshot, SessionState};

/// Full health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded
    pub status: String,
    /// Capture session state, if a supervisor is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_state: Option<SessionState>,
    /// Capture counters, if a supervisor is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureStatsSnapshot>,
    /// Live subscriber count
    pub subscribers: usize,
    /// Strikes currently held in history
    pub history_len: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}

/// Query parameters for `GET /strikes`
#[derive(Debug, Deserialize)]
pub struct StrikesQuery {
    /// Maximum number of strikes to return (default: all)
    #[serde(default)]
    pub limit: Option<usize>,
}
