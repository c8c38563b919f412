//! WebSocket Message Types
//!
//! Messages pushed from the relay to subscribers. A live strike is sent as
//! the bare strike object; the connect-time backlog is wrapped:
//!
//! ```json
//! {"type": "initial", "strikes": [{"id": "...", "timestamp": 0, "lat": 0.0, "lng": 0.0}]}
//! ```

use serde::Serialize;
use std::sync::Arc;

use crate::capture::StrikeEvent;

/// Messages sent from server to subscriber
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A newly ingested strike
    Strike(Arc<StrikeEvent>),
    /// History snapshot sent on connect
    Backlog(Backlog),
}

/// Connect-time history snapshot, most-recent-first
#[derive(Debug, Clone, Serialize)]
pub struct Backlog {
    #[serde(rename = "type")]
    kind: &'static str,
    pub strikes: Vec<Arc<StrikeEvent>>,
}

impl ServerMessage {
    pub fn backlog(strikes: Vec<Arc<StrikeEvent>>) -> Self {
        ServerMessage::Backlog(Backlog {
            kind: "initial",
            strikes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strike() -> Arc<StrikeEvent> {
        Arc::new(StrikeEvent {
            id: "strike-1699000000000-abc".to_string(),
            observed_at_millis: 1699000000000,
            lat: 10.0,
            lng: 20.0,
            extra: serde_json::Map::new(),
        })
    }

    #[test]
    fn test_server_message_serialize_strike() {
        let json = serde_json::to_value(ServerMessage::Strike(strike())).unwrap();
        assert_eq!(json["id"], "strike-1699000000000-abc");
        assert_eq!(json["timestamp"], 1699000000000i64);
        assert_eq!(json["lat"], 10.0);
        assert_eq!(json["lng"], 20.0);
        assert!(json.get("type").is_none());
    }

    #[test]
    fn test_server_message_serialize_backlog() {
        let msg = ServerMessage::backlog(vec![strike(), strike()]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.starts_with("{\"type\":\"initial\""));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["strikes"].as_array().unwrap().len(), 2);
    }
}
