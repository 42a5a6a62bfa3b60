//! Raw daily-metrics payload
//!
//! Expected shape (the `data` member of the partner API response):
//!
//! ```json
//! {
//!   "latest_time_zone": "Asia/Kolkata",
//!   "metrics": {
//!     "2024-01-02": [ { "type": "hr", "object": { "last_reading": 62 } } ]
//!   }
//! }
//! ```
//!
//! The document is kept as a loosely-typed JSON tree; every accessor walks
//! it explicitly and returns absence instead of failing on an unexpected shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One poll's worth of data, read-only once fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Value);

impl RawPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Payload with no metrics at all
    pub fn empty() -> Self {
        Self(Value::Object(Map::new()))
    }

    /// Unwrap the `data` member of an API response body.
    ///
    /// A body without an object `data` member yields an empty payload.
    pub fn from_envelope(mut body: Value) -> Self {
        match body.get_mut("data").map(Value::take) {
            Some(data @ Value::Object(_)) => Self(data),
            _ => Self::empty(),
        }
    }

    /// True when there is no day bucket to read from
    pub fn is_empty(&self) -> bool {
        self.metrics_by_day().map_or(true, Map::is_empty)
    }

    /// Time zone name reported by the ring, if any
    pub fn latest_time_zone(&self) -> Option<&str> {
        self.0
            .get("latest_time_zone")
            .and_then(Value::as_str)
            .filter(|tz| !tz.is_empty())
    }

    fn metrics_by_day(&self) -> Option<&Map<String, Value>> {
        self.0.get("metrics").and_then(Value::as_object)
    }

    /// Key of the day bucket in use: the first one in document order.
    ///
    /// Not compared against the local date; the server may bucket under a
    /// different day than the caller.
    pub fn day_key(&self) -> Option<&str> {
        self.metrics_by_day()
            .and_then(|days| days.keys().next())
            .map(String::as_str)
    }

    /// Records of the selected day bucket (empty when missing or malformed)
    pub fn day_records(&self) -> &[Value] {
        self.metrics_by_day()
            .and_then(|days| days.values().next())
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `object` of the first record whose `type` is one of `record_types`.
    ///
    /// Candidates are tried in order, so the first listed type wins when
    /// several are present.
    pub fn record(&self, record_types: &[&str]) -> Option<&Map<String, Value>> {
        let records = self.day_records();
        record_types.iter().find_map(|wanted| {
            records
                .iter()
                .find(|r| r.get("type").and_then(Value::as_str) == Some(*wanted))
                .and_then(|r| r.get("object"))
                .and_then(Value::as_object)
        })
    }
}

impl Default for RawPayload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Value> for RawPayload {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
