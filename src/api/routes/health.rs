//! Health Routes
//!
//! - GET / - Plain-text liveness (also accepts a WebSocket upgrade)
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health - Full health status

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;
use crate::capture::SessionState;
use crate::websocket;

/// Body returned by the plain-text probe
pub const ROOT_BODY: &str = "Lightning relay server is running\n";

/// GET /
///
/// Subscribers and probes share the root path: an upgrade request becomes a
/// subscriber, anything else gets the plain-text confirmation.
pub async fn root(ws: Option<WebSocketUpgrade>, State(state): State<Arc<AppState>>) -> Response {
    match ws {
        Some(ws) => websocket::upgrade(ws, &state),
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            ROOT_BODY,
        )
            .into_response(),
    }
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health
///
/// Full health status. Degraded while the capture session is not active.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let capture_state = state.capture_state();

    let status = match capture_state {
        None | Some(SessionState::Active) => "healthy",
        Some(_) => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        capture_state,
        capture: state.capture_stats.as_ref().map(|s| s.snapshot()),
        subscribers: state.hub.connection_count().await,
        history_len: state.hub.history_len().await,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }
}
