//! Metric entities
//!
//! One entity per registry entry. Values are never cached per entity: each
//! read resolves the metric again from the coordinator's shared payload.

use crate::coordinator::RefreshCoordinator;
use serde::Serialize;
use std::sync::Arc;
use ultrahuman_core::{
    metrics, DeviceClass, MetricDefinition, MetricValue, PayloadParser, StateClass,
};

/// Device every entity belongs to
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub identifiers: [(&'static str, &'static str); 1],
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

pub const DEVICE_INFO: DeviceInfo = DeviceInfo {
    identifiers: [("ultrahuman", "ultrahuman_ring")],
    name: "Ultrahuman Ring",
    manufacturer: "Ultrahuman",
    model: "Ring AIR",
};

/// Rendered snapshot of one entity, as handed to hosts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    pub unique_id: String,
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub value: Option<MetricValue>,
    pub unit: Option<&'static str>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct MetricEntity {
    definition: &'static MetricDefinition,
    unique_id: String,
    coordinator: Arc<RefreshCoordinator>,
}

impl MetricEntity {
    pub fn new(
        entry_id: &str,
        definition: &'static MetricDefinition,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            definition,
            unique_id: format!("{}_{}", entry_id, definition.key),
            coordinator,
        }
    }

    pub fn definition(&self) -> &'static MetricDefinition {
        self.definition
    }

    pub fn key(&self) -> &'static str {
        self.definition.key
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Current value, recomputed from the latest payload
    pub fn native_value(&self) -> Option<MetricValue> {
        let data = self.coordinator.data()?;
        PayloadParser::new(&data).resolve(self.definition.key)
    }

    pub fn available(&self) -> bool {
        self.coordinator.is_ready()
    }

    pub fn state(&self) -> EntityState {
        let def = self.definition;
        EntityState {
            unique_id: self.unique_id.clone(),
            key: def.key,
            name: def.name,
            icon: def.icon,
            value: self.native_value(),
            unit: def.unit,
            device_class: def.device_class,
            state_class: def.state_class,
            available: self.available(),
        }
    }
}

/// One entity per registered metric, in registry order
pub fn build_entities(entry_id: &str, coordinator: &Arc<RefreshCoordinator>) -> Vec<MetricEntity> {
    metrics()
        .iter()
        .map(|def| MetricEntity::new(entry_id, def, Arc::clone(coordinator)))
        .collect()
}

pub fn render(entities: &[MetricEntity]) -> Vec<EntityState> {
    entities.iter().map(MetricEntity::state).collect()
}
