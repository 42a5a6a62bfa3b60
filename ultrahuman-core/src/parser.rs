//! Payload parser: registry key -> extracted value
//!
//! Each metric reads one field from the `object` of a typed record in the
//! selected day bucket. The mapping is fixed in `source_for`. Any missing
//! step (bucket, record, field, malformed timestamp) resolves to `None`.

use crate::payload::RawPayload;
use crate::registry::{MetricDefinition, METRICS};
use crate::value::MetricValue;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Number,
    /// Integer seconds since the Unix epoch, rendered as localized ISO-8601
    EpochSeconds,
}

/// Where a metric lives in the payload
#[derive(Debug, Clone, Copy)]
struct Source {
    record_types: &'static [&'static str],
    path: &'static [&'static str],
    kind: FieldKind,
}

const fn number(record_types: &'static [&'static str], path: &'static [&'static str]) -> Source {
    Source { record_types, path, kind: FieldKind::Number }
}

const fn epoch(record_types: &'static [&'static str], path: &'static [&'static str]) -> Source {
    Source { record_types, path, kind: FieldKind::EpochSeconds }
}

fn source_for(key: &str) -> Option<Source> {
    let source = match key {
        // ---- Cardio ----
        "hr_last" => number(&["hr"], &["last_reading"]),
        "night_rhr" => number(&["night_rhr"], &["avg"]),
        "hrv_avg" => number(&["avg_sleep_hrv"], &["value"]),
        "sleep_rhr" => number(&["sleep_rhr"], &["value"]),
        "spo2_avg" => number(&["spo2"], &["avg"]),
        "vo2_max" => number(&["vo2_max"], &["value"]),
        // ---- Sleep ----
        "sleep_score" => number(&["sleep"], &["sleep_score", "score"]),
        "total_sleep" => number(&["sleep"], &["total_sleep", "minutes"]),
        "sleep_start" => epoch(&["sleep"], &["bedtime_start"]),
        "sleep_end" => epoch(&["sleep"], &["bedtime_end"]),
        "time_in_bed" => number(&["sleep"], &["time_in_bed", "minutes"]),
        "sleep_efficiency" => number(&["sleep"], &["sleep_efficiency"]),
        // ---- Recovery & Activity ----
        "recovery_index" => number(&["recovery_index"], &["value"]),
        "movement_index" => number(&["movement_index"], &["value"]),
        "active_minutes" => number(&["active_minutes"], &["value"]),
        "steps" => number(&["steps"], &["total"]),
        "calories" => number(&["calories"], &["total"]),
        // ---- Temperature & Stress ----
        "skin_temp" => number(&["skin_temperature"], &["avg"]),
        "temp_deviation" => number(&["skin_temperature"], &["deviation"]),
        "stress_score" => number(&["stress"], &["score"]),
        // ---- Readiness ----
        "readiness_score" => number(&["readiness"], &["score"]),
        "body_battery" => number(&["body_battery"], &["value"]),
        _ => return None,
    };
    Some(source)
}

/// Resolver bound to one payload.
///
/// Caches the time zone so that many lookups against the same poll do not
/// re-read it. Never mutates the payload.
pub struct PayloadParser<'a> {
    payload: &'a RawPayload,
    time_zone: Option<&'a str>,
}

impl<'a> PayloadParser<'a> {
    pub fn new(payload: &'a RawPayload) -> Self {
        Self {
            payload,
            time_zone: payload.latest_time_zone(),
        }
    }

    /// Day bucket the parser reads from
    pub fn day_key(&self) -> Option<&'a str> {
        self.payload.day_key()
    }

    /// Extract the value for one registry key
    pub fn resolve(&self, key: &str) -> Option<MetricValue> {
        let source = source_for(key)?;
        let object = self.payload.record(source.record_types)?;

        let (first, rest) = source.path.split_first()?;
        let field = rest
            .iter()
            .try_fold(object.get(*first)?, |node, step| node.get(*step))?;

        match source.kind {
            FieldKind::Number => match field {
                Value::Number(n) => Some(MetricValue::Number(n.clone())),
                _ => None,
            },
            FieldKind::EpochSeconds => {
                let seconds = epoch_seconds(field)?;
                epoch_to_iso(seconds, self.time_zone).map(MetricValue::Timestamp)
            }
        }
    }

    /// Resolve every registered metric, in registry order
    pub fn resolve_all(&self) -> Vec<(&'static MetricDefinition, Option<MetricValue>)> {
        METRICS.iter().map(|m| (m, self.resolve(m.key))).collect()
    }
}

/// Resolve one key against an optional payload
pub fn resolve(payload: Option<&RawPayload>, key: &str) -> Option<MetricValue> {
    PayloadParser::new(payload?).resolve(key)
}

fn epoch_seconds(field: &Value) -> Option<i64> {
    match field {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        _ => None,
    }
}

/// Convert epoch seconds to an ISO-8601 string with explicit offset.
///
/// Localized to `time_zone` (IANA name) when given, otherwise to the host's
/// local zone. Zero epoch, out-of-range values and unknown zone names yield
/// `None`.
pub fn epoch_to_iso(seconds: i64, time_zone: Option<&str>) -> Option<String> {
    if seconds == 0 {
        return None;
    }
    let Some(utc) = DateTime::<Utc>::from_timestamp(seconds, 0) else {
        debug!("Epoch {} out of range", seconds);
        return None;
    };

    let iso = match time_zone {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => utc.with_timezone(&tz).to_rfc3339_opts(SecondsFormat::Secs, false),
            Err(_) => {
                debug!("Unknown time zone '{}', dropping timestamp", name);
                return None;
            }
        },
        None => utc.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::Secs, false),
    };
    Some(iso)
}
