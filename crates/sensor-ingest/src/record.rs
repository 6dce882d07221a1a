// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Normalized sensor records and the hand-off envelope.

use serde::Serialize;
use serde_json::{Map, Value};

/// Reserved field holding the server-side arrival time (Unix seconds, `f64`).
pub const TS_FIELD: &str = "ts";

/// A decoded sensor reading stamped with its arrival time.
///
/// Built only by the normalizer and read-only afterwards. The `ts` field is
/// always present and always a JSON number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: Map<String, Value>,
}

impl NormalizedRecord {
    /// Stamp a decoded object with `arrival_ts`, overwriting any producer `ts`.
    pub(crate) fn stamp(mut fields: Map<String, Value>, arrival_ts: f64) -> Self {
        let ts = serde_json::Number::from_f64(arrival_ts)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        fields.insert(TS_FIELD.to_string(), ts);
        Self { fields }
    }

    /// Arrival time in Unix seconds.
    pub fn ts(&self) -> f64 {
        self.fields
            .get(TS_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or_default()
    }

    /// Look up a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Number of fields, `ts` included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false: a record carries at least `ts`.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize to compact JSON text.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.fields)
    }
}

/// Element type of the hand-off queue.
#[derive(Debug)]
pub enum Envelope {
    /// A record to append to the current batch.
    Record(NormalizedRecord),
    /// Flush whatever is buffered and stop the worker.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_stamp_adds_ts() {
        let record = NormalizedRecord::stamp(object(json!({"temp": 21.5})), 1_700_000_000.25);

        assert_eq!(record.ts(), 1_700_000_000.25);
        assert_eq!(record.get("temp"), Some(&json!(21.5)));
        assert_eq!(record.len(), 2);
        assert!(record.get(TS_FIELD).map(Value::is_f64).unwrap_or(false));
    }

    #[test]
    fn test_stamp_overwrites_producer_ts() {
        let record = NormalizedRecord::stamp(object(json!({"ts": "yesterday", "seq": 4})), 10.5);

        assert_eq!(record.ts(), 10.5);
        assert_eq!(record.get("seq"), Some(&json!(4)));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let record = NormalizedRecord::stamp(object(json!({"seq": 1})), 2.5);
        let text = record.to_json().unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(back, json!({"seq": 1, "ts": 2.5}));
    }
}
