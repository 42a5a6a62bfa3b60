//! Entity hosts
//!
//! A host is wherever entity states end up: the log, an MQTT broker. Hosts
//! get the full entity list once at setup and every state after each
//! refresh cycle.

pub mod mqtt;

use crate::entity::{render, EntityState, MetricEntity};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use mqtt::MqttHost;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sink for entity registrations and state updates
pub trait EntityHost: Send + Sync {
    fn name(&self) -> &str;

    /// Register entities, in order, before any state is published
    fn add_entities(&self, entities: &[EntityState]) -> Result<(), HostError>;

    fn publish(&self, state: &EntityState) -> Result<(), HostError>;

    fn shutdown(&self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Writes every state to the tracing log
#[derive(Debug, Default)]
pub struct LogHost;

impl EntityHost for LogHost {
    fn name(&self) -> &str {
        "log"
    }

    fn add_entities(&self, entities: &[EntityState]) -> Result<(), HostError> {
        info!("Registered {} entities", entities.len());
        for entity in entities {
            debug!("  {} ({})", entity.name, entity.unique_id);
        }
        Ok(())
    }

    fn publish(&self, state: &EntityState) -> Result<(), HostError> {
        match (&state.value, state.available) {
            (Some(value), true) => {
                info!("{}: {} {}", state.name, value, state.unit.unwrap_or(""))
            }
            (None, true) => debug!("{}: no data", state.name),
            (_, false) => debug!("{}: unavailable", state.name),
        }
        Ok(())
    }
}

/// Register `entities` with every host; stops at the first failing host
pub fn register_all(
    entities: &[MetricEntity],
    hosts: &[Arc<dyn EntityHost>],
) -> Result<(), HostError> {
    let states = render(entities);
    for host in hosts {
        host.add_entities(&states)?;
    }
    Ok(())
}

/// Push current states to every host. Failures are logged per host.
pub fn publish_all(entities: &[MetricEntity], hosts: &[Arc<dyn EntityHost>]) {
    let states = render(entities);
    for host in hosts {
        for state in &states {
            if let Err(e) = host.publish(state) {
                warn!("Host '{}' failed to publish {}: {}", host.name(), state.key, e);
                break;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Host that records what it was given
    #[derive(Default)]
    pub struct RecordingHost {
        pub registered: Mutex<Vec<EntityState>>,
        pub published: Mutex<Vec<EntityState>>,
        pub shut_down: Mutex<bool>,
    }

    impl EntityHost for RecordingHost {
        fn name(&self) -> &str {
            "recording"
        }

        fn add_entities(&self, entities: &[EntityState]) -> Result<(), HostError> {
            self.registered.lock().extend_from_slice(entities);
            Ok(())
        }

        fn publish(&self, state: &EntityState) -> Result<(), HostError> {
            self.published.lock().push(state.clone());
            Ok(())
        }

        fn shutdown(&self) -> Result<(), HostError> {
            *self.shut_down.lock() = true;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingHost;
    use super::*;
    use crate::api::UltrahumanClient;
    use crate::config::ApiConfig;
    use crate::coordinator::RefreshCoordinator;
    use crate::entity::build_entities;
    use std::time::Duration;
    use ultrahuman_devkit::{PayloadBuilder, TestHarness};

    #[tokio::test]
    async fn test_register_then_publish_in_order() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today().heart_rate(58))
            .await
            .unwrap();
        let api = ApiConfig {
            base_url: harness.url(),
            ..ApiConfig::default()
        };
        let client = UltrahumanClient::new(&api, "tok").unwrap();
        let coordinator = Arc::new(RefreshCoordinator::new(client, Duration::from_secs(60)));
        coordinator.first_refresh().await.unwrap();
        let entities = build_entities("e", &coordinator);

        let recorder = Arc::new(RecordingHost::default());
        let hosts: Vec<Arc<dyn EntityHost>> = vec![recorder.clone(), Arc::new(LogHost)];

        register_all(&entities, &hosts).unwrap();
        publish_all(&entities, &hosts);

        let registered = recorder.registered.lock();
        assert_eq!(registered.len(), entities.len());
        assert_eq!(registered[0].key, "hr_last");

        let published = recorder.published.lock();
        assert_eq!(published.len(), entities.len());
        assert_eq!(published[0].value.as_ref().and_then(|v| v.as_i64()), Some(58));
        assert!(published.iter().all(|s| s.available));
    }
}
