//! MQTT host
//!
//! Publishes a retained discovery document per entity, then retained
//! state and availability on every refresh. Consumers that understand
//! discovery (Home Assistant's MQTT integration among them) pick the
//! entities up without further configuration.

use super::{EntityHost, HostError};
use crate::config::{EntryInfo, MqttConfig};
use crate::entity::{EntityState, DEVICE_INFO};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Outgoing, QoS};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use ultrahuman_core::{DeviceClass, StateClass};

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";
/// State payload for a metric with no value
pub const UNKNOWN: &str = "unknown";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Time the event loop gets to flush the final messages after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Topic layout derived from the configured prefixes
#[derive(Debug, Clone, PartialEq)]
pub struct Topics {
    topic_prefix: String,
    discovery_prefix: String,
}

impl Topics {
    pub fn new(config: &MqttConfig) -> Self {
        Self {
            topic_prefix: config.topic_prefix.trim_end_matches('/').to_string(),
            discovery_prefix: config.discovery_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Bridge-wide status, also the last-will topic
    pub fn status(&self) -> String {
        format!("{}/status", self.topic_prefix)
    }

    pub fn state(&self, key: &str) -> String {
        format!("{}/{}/state", self.topic_prefix, key)
    }

    pub fn availability(&self, key: &str) -> String {
        format!("{}/{}/availability", self.topic_prefix, key)
    }

    pub fn discovery(&self, unique_id: &str) -> String {
        format!("{}/sensor/{}/config", self.discovery_prefix, unique_id)
    }
}

#[derive(Debug, Serialize)]
struct AvailabilityTopic {
    topic: String,
}

#[derive(Debug, Serialize)]
struct DiscoveryDevice {
    identifiers: Vec<String>,
    name: &'static str,
    manufacturer: &'static str,
    model: &'static str,
}

/// Discovery document for one entity
#[derive(Debug, Serialize)]
pub struct DiscoveryConfig {
    name: &'static str,
    unique_id: String,
    object_id: String,
    state_topic: String,
    availability: Vec<AvailabilityTopic>,
    availability_mode: &'static str,
    icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<DeviceClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<StateClass>,
    device: DiscoveryDevice,
}

pub fn discovery_config(topics: &Topics, entity: &EntityState) -> DiscoveryConfig {
    DiscoveryConfig {
        name: entity.name,
        unique_id: entity.unique_id.clone(),
        object_id: format!("ultrahuman_{}", entity.key),
        state_topic: topics.state(entity.key),
        availability: vec![
            AvailabilityTopic { topic: topics.status() },
            AvailabilityTopic { topic: topics.availability(entity.key) },
        ],
        availability_mode: "all",
        icon: entity.icon,
        unit_of_measurement: entity.unit,
        device_class: entity.device_class,
        state_class: entity.state_class,
        device: DiscoveryDevice {
            identifiers: DEVICE_INFO
                .identifiers
                .iter()
                .map(|(domain, id)| format!("{}_{}", domain, id))
                .collect(),
            name: DEVICE_INFO.name,
            manufacturer: DEVICE_INFO.manufacturer,
            model: DEVICE_INFO.model,
        },
    }
}

/// Wire form of a state value
pub fn state_payload(state: &EntityState) -> String {
    state
        .value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

pub struct MqttHost {
    client: AsyncClient,
    topics: Topics,
    stopping: Arc<AtomicBool>,
    event_loop: JoinHandle<()>,
}

impl MqttHost {
    /// Create the client and start its event loop.
    ///
    /// Must be called inside a tokio runtime. Connection errors are retried
    /// by the event loop; publishes queue until the broker is reachable.
    pub fn connect(config: &MqttConfig, entry: &EntryInfo) -> Self {
        Self::start(config, entry, RECONNECT_DELAY)
    }

    fn start(config: &MqttConfig, entry: &EntryInfo, reconnect_delay: Duration) -> Self {
        let topics = Topics::new(config);
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("ultrahuman-agent-{}", entry.entry_id));

        let mut mqtt_options = MqttOptions::new(client_id, &config.broker_host, config.broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(u64::from(config.keep_alive_secs.max(5))));
        mqtt_options.set_clean_session(true);
        mqtt_options.set_last_will(LastWill::new(topics.status(), OFFLINE, QoS::AtLeastOnce, true));

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);
        let stopping = Arc::new(AtomicBool::new(false));

        let event_loop = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            topics.status(),
            Arc::clone(&stopping),
            reconnect_delay,
        ));

        info!(
            "MQTT host configured for {}:{} (prefix '{}')",
            config.broker_host, config.broker_port, topics.topic_prefix
        );

        Self {
            client,
            topics,
            stopping,
            event_loop,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    fn send(&self, topic: String, payload: impl Into<Vec<u8>>) -> Result<(), HostError> {
        self.client.try_publish(topic, QoS::AtLeastOnce, true, payload)?;
        Ok(())
    }
}

impl EntityHost for MqttHost {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn add_entities(&self, entities: &[EntityState]) -> Result<(), HostError> {
        for entity in entities {
            let document = serde_json::to_vec(&discovery_config(&self.topics, entity))?;
            self.send(self.topics.discovery(&entity.unique_id), document)?;
        }
        self.send(self.topics.status(), ONLINE)?;
        info!("Published discovery for {} entities", entities.len());
        Ok(())
    }

    fn publish(&self, state: &EntityState) -> Result<(), HostError> {
        let availability = if state.available { ONLINE } else { OFFLINE };
        self.send(self.topics.availability(state.key), availability)?;
        self.send(self.topics.state(state.key), state_payload(state))?;
        debug!("Published {} = {}", state.key, state_payload(state));
        Ok(())
    }

    fn shutdown(&self) -> Result<(), HostError> {
        self.stopping.store(true, Ordering::SeqCst);
        let offline = self.send(self.topics.status(), OFFLINE);
        let disconnect = self.client.try_disconnect();

        // The loop exits once the disconnect is sent; abort it if it does not
        let abort = self.event_loop.abort_handle();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(SHUTDOWN_GRACE).await;
                    abort.abort();
                });
            }
            Err(_) => abort.abort(),
        }

        offline?;
        disconnect?;
        Ok(())
    }
}

impl Drop for MqttHost {
    fn drop(&mut self) {
        if !self.stopping.load(Ordering::SeqCst) {
            self.event_loop.abort();
        }
    }
}

/// Drive the connection. Every (re)connect re-publishes the retained
/// `online` status, since the broker fires the last will on each drop.
async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    status_topic: String,
    stopping: Arc<AtomicBool>,
    reconnect_delay: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("Connected to MQTT broker");
                let online = client.try_publish(status_topic.as_str(), QoS::AtLeastOnce, true, ONLINE);
                if let Err(e) = online {
                    warn!("Failed to publish MQTT status: {}", e);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                error!("MQTT connection error: {}", e);
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }
    debug!("MQTT event loop stopped");
}
