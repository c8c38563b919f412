//! Strike Relay HTTP Endpoint
//!
//! HTTP and WebSocket surface, built with Axum. Subscribers and probes share
//! one port.
//!
//! # Endpoints
//!
//! ## Subscribers
//! - `GET /` with upgrade - Real-time strike stream
//! - `GET /ws` - Real-time strike stream
//!
//! ## Strikes
//! - `GET /strikes` - Recent strikes (`?limit=N`)
//!
//! ## Health
//! - `GET /` - Plain-text liveness
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use strike_relay::api::{bind, serve, ApiConfig, AppState};
//! use strike_relay::websocket::{HubConfig, RelayHub};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(RelayHub::new(HubConfig::default()));
//!     let config = ApiConfig::default();
//!
//!     let listener = bind(&config).await?;
//!     let state = AppState::new(hub, config, CancellationToken::new());
//!     serve(listener, state).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::health::root))
        .route("/ws", get(websocket_handler))
        .route("/strikes", get(routes::strikes::list_strikes))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Bind the listening socket
pub async fn bind(config: &ApiConfig) -> Result<TcpListener, ApiError> {
    let addr = config.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(source) => return Err(ApiError::Bind { addr, source }),
    };
    tracing::info!("Lightning relay server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve until the state's shutdown token is cancelled.
///
/// Stops accepting new connections on cancellation; open subscriber
/// connections are closed through the hub.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ApiError> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureStats, SessionState, StrikeEvent};
    use crate::websocket::{HubConfig, RelayHub};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    fn create_test_app() -> (Router, Arc<RelayHub>) {
        let hub = Arc::new(RelayHub::new(HubConfig::default()));
        let state = AppState::new(Arc::clone(&hub), ApiConfig::default(), CancellationToken::new());
        (build_router(state), hub)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn strike(n: i64) -> StrikeEvent {
        StrikeEvent {
            id: format!("strike-{}", n),
            observed_at_millis: n,
            lat: 1.0,
            lng: 2.0,
            extra: serde_json::Map::new(),
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_root_plain_text() {
        let (app, _hub) = create_test_app();

        let response = app.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
        assert_eq!(body_string(response).await, routes::health::ROOT_BODY);
    }

    #[tokio::test]
    async fn test_health_live() {
        let (app, _hub) = create_test_app();
        let response = app.oneshot(get("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_without_capture() {
        let (app, hub) = create_test_app();
        hub.ingest(strike(1)).await;

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["history_len"], 1);
        assert_eq!(json["subscribers"], 0);
        assert!(json.get("capture_state").is_none());
    }

    #[tokio::test]
    async fn test_health_degraded_while_capture_failed() {
        let hub = Arc::new(RelayHub::new(HubConfig::default()));
        let (_tx, rx) = watch::channel(SessionState::Failed);
        let state = AppState::new(hub, ApiConfig::default(), CancellationToken::new())
            .with_capture(rx, Arc::new(CaptureStats::default()));
        let app = build_router(state);

        let response = app.oneshot(get("/health")).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();

        assert_eq!(json["status"], "degraded");
        assert_eq!(json["capture_state"], "failed");
        assert_eq!(json["capture"]["sessions_started"], 0);
    }

    #[tokio::test]
    async fn test_list_strikes() {
        let (app, hub) = create_test_app();
        for n in 1..=3 {
            hub.ingest(strike(n)).await;
        }

        let response = app.clone().oneshot(get("/strikes")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[0]["id"], "strike-3");

        let response = app.oneshot(get("/strikes?limit=2")).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_strikes_zero_limit() {
        let (app, _hub) = create_test_app();

        let response = app.oneshot(get("/strikes?limit=0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }
}
