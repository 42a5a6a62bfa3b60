/*!
Builders for partner API documents

Produces the `data` member (`build`) or the full response body (`envelope`)
in the shape the daily-metrics endpoint returns.
*/

use serde_json::{json, Map, Value};

/// Fluent builder for one daily-metrics payload
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    time_zone: Option<String>,
    days: Vec<(String, Vec<Value>)>,
}

impl PayloadBuilder {
    /// Payload with a single (empty) bucket for `day`
    pub fn new<S: Into<String>>(day: S) -> Self {
        Self {
            time_zone: None,
            days: vec![(day.into(), Vec::new())],
        }
    }

    /// Payload keyed under the local current date
    pub fn today() -> Self {
        Self::new(chrono::Local::now().format("%Y-%m-%d").to_string())
    }

    /// Payload without any day bucket
    pub fn without_days() -> Self {
        Self {
            time_zone: None,
            days: Vec::new(),
        }
    }

    pub fn time_zone<S: Into<String>>(mut self, tz: S) -> Self {
        self.time_zone = Some(tz.into());
        self
    }

    /// Append a `{type, object}` record to the last bucket
    pub fn record<S: Into<String>>(mut self, record_type: S, object: Value) -> Self {
        let record = json!({ "type": record_type.into(), "object": object });
        match self.days.last_mut() {
            Some((_, records)) => records.push(record),
            None => self.days.push((chrono::Local::now().format("%Y-%m-%d").to_string(), vec![record])),
        }
        self
    }

    /// Start another bucket; later records go there
    pub fn day<S: Into<String>>(mut self, day: S) -> Self {
        self.days.push((day.into(), Vec::new()));
        self
    }

    pub fn heart_rate(self, last_reading: i64) -> Self {
        self.record("hr", json!({ "last_reading": last_reading }))
    }

    pub fn steps(self, total: i64) -> Self {
        self.record("steps", json!({ "total": total }))
    }

    pub fn sleep(self, bedtime_start: i64, bedtime_end: i64, score: i64) -> Self {
        self.record(
            "sleep",
            json!({
                "bedtime_start": bedtime_start,
                "bedtime_end": bedtime_end,
                "sleep_score": { "score": score },
                "total_sleep": { "minutes": (bedtime_end - bedtime_start) / 60 - 35 },
                "time_in_bed": { "minutes": (bedtime_end - bedtime_start) / 60 },
                "sleep_efficiency": 92
            }),
        )
    }

    /// A realistic day covering every known record type
    pub fn full_day<S: Into<String>>(day: S) -> Self {
        Self::new(day)
            .time_zone("Asia/Kolkata")
            .heart_rate(62)
            .record("night_rhr", json!({ "avg": 54 }))
            .record("avg_sleep_hrv", json!({ "value": 48 }))
            .record("sleep_rhr", json!({ "value": 52 }))
            .record("spo2", json!({ "avg": 97.4 }))
            .record("vo2_max", json!({ "value": 41.2 }))
            .sleep(1704200400, 1704227400, 81)
            .record("recovery_index", json!({ "value": 77 }))
            .record("movement_index", json!({ "value": 65 }))
            .record("active_minutes", json!({ "value": 38 }))
            .steps(4200)
            .record("calories", json!({ "total": 1875 }))
            .record("skin_temperature", json!({ "avg": 34.6, "deviation": -0.2, "last_reading": 34.8 }))
            .record("stress", json!({ "score": 31 }))
            .record("readiness", json!({ "score": 74 }))
            .record("body_battery", json!({ "value": 68 }))
    }

    /// The `data` member
    pub fn build(&self) -> Value {
        let mut metrics = Map::new();
        for (day, records) in &self.days {
            metrics.insert(day.clone(), Value::Array(records.clone()));
        }
        json!({
            "latest_time_zone": self.time_zone,
            "metrics": metrics,
        })
    }

    /// Full response body: `{"data": ...}`
    pub fn envelope(&self) -> Value {
        json!({ "data": self.build() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_shape() {
        let payload = PayloadBuilder::new("2024-05-01")
            .time_zone("UTC")
            .heart_rate(62)
            .steps(4200)
            .build();

        assert_eq!(payload["latest_time_zone"], "UTC");
        assert_eq!(payload["metrics"]["2024-05-01"][0]["type"], "hr");
        assert_eq!(payload["metrics"]["2024-05-01"][1]["object"]["total"], 4200);
    }

    #[test]
    fn test_days_keep_insertion_order() {
        let payload = PayloadBuilder::new("2024-05-02").day("2024-05-01").steps(1).build();
        let keys: Vec<_> = payload["metrics"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["2024-05-02", "2024-05-01"]);
    }

    #[test]
    fn test_envelope_wraps_data() {
        let body = PayloadBuilder::without_days().envelope();
        assert!(body["data"]["metrics"].as_object().unwrap().is_empty());
        assert!(body["data"]["latest_time_zone"].is_null());
    }
}
