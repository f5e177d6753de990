//! Tagged unions over the upstream response shapes.
//!
//! The vendor has shipped several layouts for the same endpoints over time.
//! Each body is classified once into a variant here; downstream code matches
//! on the variant instead of probing fields.

use super::provider::{FetchError, RawBody};
use crate::domain::RawEntry;
use crate::normalize::json_scalar;
use serde_json::{Map, Value};

/// Keys under which the vendor reports an error instead of data.
const UPSTREAM_ERROR_KEYS: [&str; 4] = ["error", "Error Message", "Note", "Information"];

/// Keys that hold a date-keyed series map in the older layouts.
const KEYED_SERIES_KEYS: [&str; 4] = ["data", "Monthly Time Series", "Time Series (Monthly)", "series"];

/// Shape of a series response.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesPayload {
    /// `{"name": .., "data": [{"date", "value"}]}`, also with a `status` envelope.
    Wrapped(Vec<Value>),
    /// `[{"date", "value"}]`
    Bare(Vec<Value>),
    /// `{"Monthly Time Series": {"2024-01-01": {"value": "5.33"}}}`
    Keyed(Map<String, Value>),
}

impl SeriesPayload {
    pub fn classify(body: Value) -> Result<Self, FetchError> {
        match body {
            Value::Array(records) => Ok(SeriesPayload::Bare(records)),
            Value::Object(mut map) => {
                if let Some(message) = upstream_error(&map) {
                    return Err(FetchError::Upstream(message));
                }
                // Only a collection under a known key is taken out of the map,
                // so the shape error still lists every key.
                let found = KEYED_SERIES_KEYS
                    .into_iter()
                    .find(|key| matches!(map.get(*key), Some(Value::Object(_) | Value::Array(_))));
                match found.and_then(|key| map.remove(key)) {
                    Some(Value::Object(series)) => return Ok(SeriesPayload::Keyed(series)),
                    Some(Value::Array(records)) => return Ok(SeriesPayload::Wrapped(records)),
                    _ => {}
                }
                Err(FetchError::UnexpectedShape(describe_object(&map)))
            }
            other => Err(FetchError::UnexpectedShape(format!("{} body", json_type(&other)))),
        }
    }

    /// Flattens into `{date, value}` entries. Records without a date are
    /// dropped; a missing value becomes the empty missing-marker.
    pub fn into_entries(self) -> Vec<RawEntry> {
        match self {
            SeriesPayload::Wrapped(records) | SeriesPayload::Bare(records) => records
                .iter()
                .filter_map(|rec| {
                    let date = rec.get("date").and_then(json_scalar)?;
                    let value = rec.get("value").and_then(json_scalar).unwrap_or_default();
                    Some(RawEntry::new(date, value))
                })
                .collect(),
            SeriesPayload::Keyed(series) => series
                .into_iter()
                .map(|(date, rec)| {
                    let value = match &rec {
                        Value::Object(fields) => fields
                            .values()
                            .filter_map(json_scalar)
                            .find(|v| v != "."),
                        scalar => json_scalar(scalar),
                    };
                    RawEntry::new(date, value.unwrap_or_default())
                })
                .collect(),
        }
    }
}

/// Shape of an event feed response.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Object whose records live under a named array field, e.g.
    /// `{"symbol": "IBM", "quarterlyEarnings": [..]}`.
    Object(Map<String, Value>),
    /// Bare array of records.
    Array(Vec<Value>),
    /// `{"symbol": .., "data": [..]}`.
    Nested { symbol: Option<String>, records: Vec<Value> },
    /// Delimited text with a header row.
    Delimited(String),
}

impl EventPayload {
    pub fn classify(body: RawBody) -> Result<Self, FetchError> {
        match body {
            RawBody::Text(text) | RawBody::Json(Value::String(text)) => Ok(EventPayload::Delimited(text)),
            RawBody::Json(Value::Array(records)) => Ok(EventPayload::Array(records)),
            RawBody::Json(Value::Object(mut map)) => {
                if let Some(message) = upstream_error(&map) {
                    return Err(FetchError::Upstream(message));
                }
                if matches!(map.get("data"), Some(Value::Array(_))) {
                    let symbol = map.get("symbol").and_then(json_scalar);
                    let records = match map.remove("data") {
                        Some(Value::Array(records)) => records,
                        _ => Vec::new(),
                    };
                    return Ok(EventPayload::Nested { symbol, records });
                }
                Ok(EventPayload::Object(map))
            }
            RawBody::Json(other) => Err(FetchError::UnexpectedShape(format!(
                "{} body",
                json_type(&other)
            ))),
        }
    }

    /// Symbol the payload claims to describe, when it carries one.
    pub fn symbol(&self) -> Option<String> {
        match self {
            EventPayload::Object(map) => map.get("symbol").and_then(json_scalar),
            EventPayload::Nested { symbol, .. } => symbol.clone(),
            EventPayload::Array(_) | EventPayload::Delimited(_) => None,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            EventPayload::Object(_) => "object",
            EventPayload::Array(_) => "array",
            EventPayload::Nested { .. } => "nested data object",
            EventPayload::Delimited(_) => "delimited text",
        }
    }
}

fn upstream_error(map: &Map<String, Value>) -> Option<String> {
    UPSTREAM_ERROR_KEYS.iter().find_map(|key| {
        map.get(*key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    })
}

fn describe_object(map: &Map<String, Value>) -> String {
    let keys: Vec<&str> = map.keys().map(String::as_str).take(5).collect();
    format!("object with keys [{}]", keys.join(", "))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_series_layout() {
        let body = json!({
            "name": "Effective Federal Funds Rate",
            "interval": "monthly",
            "data": [{"date": "2024-02-01", "value": "5.33"}, {"date": "2024-01-01", "value": "5.33"}]
        });
        let payload = SeriesPayload::classify(body).unwrap();
        assert!(matches!(payload, SeriesPayload::Wrapped(_)));
        let entries = payload.into_entries();
        assert_eq!(entries[0], RawEntry::new("2024-02-01", "5.33"));
    }

    #[test]
    fn bare_and_keyed_series_layouts() {
        let bare = SeriesPayload::classify(json!([{"date": "2024-01-01", "value": 3.7}])).unwrap();
        assert_eq!(bare.into_entries(), vec![RawEntry::new("2024-01-01", "3.7")]);

        let keyed = SeriesPayload::classify(json!({
            "Monthly Time Series": {"2024-01-01": {"1. value": "5.33"}, "2023-12-01": "5.33"}
        }))
        .unwrap();
        let mut entries = keyed.into_entries();
        entries.sort_by(|a, b| a.date.cmp(&b.date));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].value, "5.33");
    }

    #[test]
    fn keyed_series_under_data_field() {
        let payload = SeriesPayload::classify(json!({
            "data": {"2024-01-01": {"value": "5.33"}, "2024-02-01": "5.30"}
        }))
        .unwrap();
        assert!(matches!(payload, SeriesPayload::Keyed(_)));
        let mut entries = payload.into_entries();
        entries.sort_by(|a, b| a.date.cmp(&b.date));
        assert_eq!(
            entries,
            vec![RawEntry::new("2024-01-01", "5.33"), RawEntry::new("2024-02-01", "5.30")]
        );
    }

    #[test]
    fn series_rejects_unknown_shapes_and_upstream_notes() {
        let err = SeriesPayload::classify(json!({"meta": 1})).unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedShape(_)));

        let err = SeriesPayload::classify(json!({"data": null, "meta": 1})).unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedShape(m) if m.contains("data")));

        let err = SeriesPayload::classify(json!({"Information": "rate limit"})).unwrap_err();
        assert!(matches!(err, FetchError::Upstream(m) if m == "rate limit"));

        assert!(SeriesPayload::classify(json!("text")).is_err());
    }

    #[test]
    fn event_payload_variants() {
        let csv = "symbol,reportDate\nIBM,2024-04-24".to_string();
        assert_eq!(
            EventPayload::classify(RawBody::Text(csv.clone())).unwrap(),
            EventPayload::Delimited(csv)
        );

        let nested = EventPayload::classify(RawBody::Json(json!({"symbol": "IBM", "data": []}))).unwrap();
        assert_eq!(nested.symbol().as_deref(), Some("IBM"));
        assert_eq!(nested.shape_name(), "nested data object");

        let object =
            EventPayload::classify(RawBody::Json(json!({"symbol": "IBM", "quarterlyEarnings": []}))).unwrap();
        assert!(matches!(object, EventPayload::Object(_)));

        let err = EventPayload::classify(RawBody::Json(json!({"error": "boom"}))).unwrap_err();
        assert!(matches!(err, FetchError::Upstream(_)));
    }
}
