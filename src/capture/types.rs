//! Capture Types
//!
//! The normalized strike record and the capture session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single detected lightning strike, normalized from an upstream frame.
///
/// Created once by the extractor and never mutated afterwards; the relay hub
/// only clones `Arc`s of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeEvent {
    /// Unique id (`strike-<millis>-<random>`)
    pub id: String,
    /// Wall-clock milliseconds at extraction time
    #[serde(rename = "timestamp")]
    pub observed_at_millis: i64,
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
    /// Additional upstream fields carried through verbatim
    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle of the upstream capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// A session is being established
    Starting,
    /// A session is established and delivering frames
    Active,
    /// The last session failed; waiting out the restart delay
    Failed,
    /// Shutdown was requested; no further sessions will start
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Failed => "failed",
            SessionState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}
