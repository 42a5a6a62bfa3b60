//! Metric registry
//!
//! Single source of truth for every exposed metric. Order here is the
//! registration order and therefore the entity display order. Adding a
//! metric is a code change: append a definition here and a source mapping
//! in `parser`.

use serde::Serialize;

/// Semantic class of a metric, used by hosts to pick formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Duration,
    Temperature,
    Timestamp,
}

/// Statistical class of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Instantaneous reading
    Measurement,
    /// Monotonically increasing daily total
    TotalIncreasing,
}

/// Display metadata for one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricDefinition {
    /// Stable key, unique across the registry
    pub key: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Material Design icon identifier
    pub icon: &'static str,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    /// Native unit of measurement
    pub unit: Option<&'static str>,
}

const fn metric(
    key: &'static str,
    name: &'static str,
    icon: &'static str,
    device_class: Option<DeviceClass>,
    state_class: Option<StateClass>,
    unit: Option<&'static str>,
) -> MetricDefinition {
    MetricDefinition { key, name, icon, device_class, state_class, unit }
}

use DeviceClass::{Duration, Temperature, Timestamp};
use StateClass::{Measurement, TotalIncreasing};

pub const PERCENTAGE: &str = "%";
pub const MINUTES: &str = "min";
pub const CELSIUS: &str = "°C";

/// Every metric exposed as an entity, in display order
pub static METRICS: &[MetricDefinition] = &[
    // ---- Cardio ----
    metric("hr_last", "Heart Rate", "mdi:heart-pulse", None, Some(Measurement), Some("bpm")),
    metric("night_rhr", "Night Resting HR", "mdi:heart", None, Some(Measurement), Some("bpm")),
    metric("hrv_avg", "HRV", "mdi:heart-flash", None, Some(Measurement), Some("ms")),
    metric("sleep_rhr", "Sleep RHR", "mdi:heart-minus", None, Some(Measurement), Some("bpm")),
    metric("spo2_avg", "SpO2", "mdi:water-percent", None, Some(Measurement), Some(PERCENTAGE)),
    metric("vo2_max", "VO2 Max", "mdi:lungs", None, Some(Measurement), Some("mL/kg/min")),
    // ---- Sleep ----
    metric("sleep_score", "Sleep Score", "mdi:sleep", None, Some(Measurement), None),
    metric("total_sleep", "Total Sleep", "mdi:bed-clock", Some(Duration), Some(Measurement), Some(MINUTES)),
    metric("sleep_start", "Sleep Start", "mdi:bed", Some(Timestamp), None, None),
    metric("sleep_end", "Sleep End", "mdi:bed-outline", Some(Timestamp), None, None),
    metric("time_in_bed", "Time in Bed", "mdi:bed-king", Some(Duration), Some(Measurement), Some(MINUTES)),
    metric("sleep_efficiency", "Sleep Efficiency", "mdi:percent-circle", None, Some(Measurement), Some(PERCENTAGE)),
    // ---- Recovery & Activity ----
    metric("recovery_index", "Recovery Index", "mdi:battery-heart-variant", None, Some(Measurement), None),
    metric("movement_index", "Movement Index", "mdi:run", None, Some(Measurement), None),
    metric("active_minutes", "Active Minutes", "mdi:timer", Some(Duration), Some(Measurement), Some(MINUTES)),
    metric("steps", "Steps", "mdi:shoe-print", None, Some(TotalIncreasing), Some("steps")),
    metric("calories", "Calories", "mdi:fire", None, Some(TotalIncreasing), Some("kcal")),
    // ---- Temperature & Stress ----
    metric("skin_temp", "Skin Temperature", "mdi:thermometer", Some(Temperature), Some(Measurement), Some(CELSIUS)),
    metric("temp_deviation", "Temperature Deviation", "mdi:thermometer-lines", Some(Temperature), Some(Measurement), Some(CELSIUS)),
    metric("stress_score", "Stress Score", "mdi:head-heart", None, Some(Measurement), None),
    // ---- Readiness ----
    metric("readiness_score", "Readiness Score", "mdi:gauge", None, Some(Measurement), None),
    metric("body_battery", "Body Battery", "mdi:battery-charging-medium", None, Some(Measurement), None),
];

/// All registered metrics in display order
pub fn metrics() -> &'static [MetricDefinition] {
    METRICS
}

/// Look up a metric definition by key
pub fn find_metric(key: &str) -> Option<&'static MetricDefinition> {
    METRICS.iter().find(|m| m.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_unique() {
        let keys: HashSet<_> = METRICS.iter().map(|m| m.key).collect();
        assert_eq!(keys.len(), METRICS.len());
    }

    #[test]
    fn test_registration_order_is_stable() {
        assert_eq!(metrics()[0].key, "hr_last");
        assert_eq!(metrics().last().map(|m| m.key), Some("body_battery"));
    }

    #[test]
    fn test_covers_all_field_families() {
        for key in [
            "hr_last", "night_rhr", "hrv_avg", "sleep_rhr", "spo2_avg", "vo2_max",
            "sleep_score", "total_sleep", "sleep_start", "sleep_end", "time_in_bed",
            "sleep_efficiency", "recovery_index", "movement_index", "active_minutes",
            "steps", "calories", "skin_temp", "temp_deviation", "stress_score",
            "readiness_score", "body_battery",
        ] {
            assert!(find_metric(key).is_some(), "missing metric {key}");
        }
    }

    #[test]
    fn test_timestamps_have_no_unit_or_state_class() {
        for m in METRICS.iter().filter(|m| m.device_class == Some(Timestamp)) {
            assert!(m.unit.is_none(), "{} has a unit", m.key);
            assert!(m.state_class.is_none(), "{} has a state class", m.key);
        }
    }

    #[test]
    fn test_find_unknown_key() {
        assert!(find_metric("blood_glucose").is_none());
    }
}
