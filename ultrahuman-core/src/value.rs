//! Extracted metric values

use serde::Serialize;
use serde_json::Number;
use std::fmt;

/// A single resolved metric value.
///
/// Absence is expressed as `Option<MetricValue>::None`, never as zero or an
/// empty string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Numeric reading, kept as received (integer or float)
    Number(Number),
    /// Localized ISO-8601 timestamp
    Timestamp(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => n.as_f64(),
            MetricValue::Timestamp(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Number(n) => n.as_i64(),
            MetricValue::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&str> {
        match self {
            MetricValue::Timestamp(s) => Some(s),
            MetricValue::Number(_) => None,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Number(v.into())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{n}"),
            MetricValue::Timestamp(s) => f.write_str(s),
        }
    }
}
