//! Strike Extraction
//!
//! Turns decoded upstream text into a [`StrikeEvent`], or rejects the frame.
//! The upstream calls longitude `lon`; the relay normalizes it to `lng`.

use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::types::StrikeEvent;

/// Latitude key in upstream frames.
const LATITUDE_KEY: &str = "lat";

/// Longitude keys in lookup order.
const LONGITUDE_KEYS: [&str; 2] = ["lon", "lng"];

/// Keys owned by the relay; never carried through from upstream.
/// `type` is the backlog message discriminator.
const RESERVED_KEYS: [&str; 6] = ["lat", "lon", "lng", "id", "timestamp", "type"];

/// Why a decoded frame did not produce a strike.
///
/// Rejections are per-frame and final; the frame is logged and dropped.
#[derive(Debug, Error, PartialEq)]
pub enum Rejected {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingFields(&'static str),

    #[error("Invalid coordinate {field}: {value}")]
    InvalidCoordinate { field: &'static str, value: String },
}

impl Rejected {
    /// Short label for counters and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Rejected::ParseError(_) => "parse_error",
            Rejected::MissingFields(_) => "missing_fields",
            Rejected::InvalidCoordinate { .. } => "invalid_coordinate",
        }
    }
}

/// Builds strike records from decoded text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrikeExtractor {
    /// Copy non-coordinate upstream fields into [`StrikeEvent::extra`]
    pub carry_upstream_fields: bool,
}

impl StrikeExtractor {
    pub fn new(carry_upstream_fields: bool) -> Self {
        Self {
            carry_upstream_fields,
        }
    }

    /// Extract a strike from decoded upstream text.
    pub fn extract(&self, text: &str) -> Result<StrikeEvent, Rejected> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Rejected::ParseError(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(Rejected::MissingFields(LATITUDE_KEY));
        };

        let lat_raw = present(&fields, LATITUDE_KEY).ok_or(Rejected::MissingFields(LATITUDE_KEY))?;
        let (lng_key, lng_raw) = LONGITUDE_KEYS
            .iter()
            .find_map(|key| present(&fields, key).map(|v| (*key, v)))
            .ok_or(Rejected::MissingFields("lon"))?;

        let lat = coerce(LATITUDE_KEY, lat_raw, 90.0)?;
        let lng = coerce(lng_key, lng_raw, 180.0)?;

        let extra = if self.carry_upstream_fields {
            fields
                .into_iter()
                .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
                .collect()
        } else {
            Map::new()
        };

        let now = chrono::Utc::now().timestamp_millis();

        Ok(StrikeEvent {
            id: new_strike_id(now),
            observed_at_millis: now,
            lat,
            lng,
            extra,
        })
    }
}

/// Extract with default options (no upstream field carry-through).
pub fn extract(text: &str) -> Result<StrikeEvent, Rejected> {
    StrikeExtractor::default().extract(text)
}

/// Mint a strike id from a timestamp and a random component.
fn new_strike_id(now_millis: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("strike-{}-{}", now_millis, &random[..12])
}

/// A field counts as present unless it is absent or `null`.
fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

fn coerce(field: &'static str, value: &Value, limit: f64) -> Result<f64, Rejected> {
    let invalid = || Rejected::InvalidCoordinate {
        field,
        value: value.to_string(),
    };

    let n = match value {
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if !n.is_finite() || n.abs() > limit {
        return Err(invalid());
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_normalizes_lon() {
        let before = chrono::Utc::now().timestamp_millis();
        let strike = extract(r#"{"lat": 12.5, "lon": -8.25}"#).unwrap();

        assert_eq!(strike.lat, 12.5);
        assert_eq!(strike.lng, -8.25);
        assert!(strike.id.starts_with("strike-"));
        assert!(strike.observed_at_millis >= before);
        assert!(strike.extra.is_empty());
    }

    #[test]
    fn test_extract_accepts_lng() {
        let strike = extract(r#"{"lat": 1, "lng": 2}"#).unwrap();
        assert_eq!(strike.lng, 2.0);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = extract(r#"{"lat": 1, "lon": 2}"#).unwrap();
        let b = extract(r#"{"lat": 1, "lon": 2}"#).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_missing_lon() {
        let err = extract(r#"{"lat": 12.5}"#).unwrap_err();
        assert!(matches!(err, Rejected::MissingFields(_)));
        assert_eq!(err.kind(), "missing_fields");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = extract(r#"{"lat": null, "lon": 3}"#).unwrap_err();
        assert_eq!(err, Rejected::MissingFields("lat"));
    }

    #[test]
    fn test_non_object_json() {
        let err = extract("[1, 2]").unwrap_err();
        assert!(matches!(err, Rejected::MissingFields(_)));
    }

    #[test]
    fn test_non_json() {
        let err = extract("not json at all").unwrap_err();
        assert!(matches!(err, Rejected::ParseError(_)));
    }

    #[test]
    fn test_string_coordinates_are_coerced() {
        let strike = extract(r#"{"lat": " 45.5 ", "lon": "-120"}"#).unwrap();
        assert_eq!(strike.lat, 45.5);
        assert_eq!(strike.lng, -120.0);
    }

    #[test]
    fn test_invalid_coordinates() {
        let err = extract(r#"{"lat": "north", "lon": 1}"#).unwrap_err();
        assert!(matches!(err, Rejected::InvalidCoordinate { field: "lat", .. }));

        let err = extract(r#"{"lat": 1, "lon": true}"#).unwrap_err();
        assert!(matches!(err, Rejected::InvalidCoordinate { field: "lon", .. }));

        let err = extract(r#"{"lat": 91, "lon": 0}"#).unwrap_err();
        assert_eq!(err.kind(), "invalid_coordinate");
    }

    #[test]
    fn test_carry_upstream_fields() {
        let extractor = StrikeExtractor::new(true);
        let strike = extractor
            .extract(r#"{"lat": 1, "lon": 2, "alt": 0, "pol": -1, "id": "x", "timestamp": 5}"#)
            .unwrap();

        assert_eq!(strike.extra.len(), 2);
        assert_eq!(strike.extra["pol"], -1);
        assert_ne!(strike.id, "x");
        assert_ne!(strike.observed_at_millis, 5);
    }

    #[test]
    fn test_carried_fields_never_include_type() {
        let extractor = StrikeExtractor::new(true);
        let strike = extractor
            .extract(r#"{"lat": 1, "lon": 2, "type": "initial", "pol": 1}"#)
            .unwrap();

        assert!(!strike.extra.contains_key("type"));
        let json = serde_json::to_value(&strike).unwrap();
        assert!(json.get("type").is_none());
        assert_eq!(json["pol"], 1);
    }
}
