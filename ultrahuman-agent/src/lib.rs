//! Ultrahuman Agent - ring metrics as polled entities
//!
//! Polls the Ultrahuman partner API on a fixed interval and exposes every
//! known metric as an entity:
//! - Single fetch per refresh, shared read-only by all entities
//! - Entity states pushed to hosts (log, MQTT discovery) after each refresh
//! - Optional local HTTP read API
//! - Token kept in the OS keyring, settings in a TOML file

pub mod api;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod host;
pub mod http;
pub mod lifecycle;
pub mod wizard;

pub use api::{ClientError, UltrahumanClient};
pub use config::{AgentConfig, ConfigError};
pub use coordinator::{RefreshCoordinator, RefreshTask};
pub use entity::{build_entities, DeviceInfo, EntityState, MetricEntity, DEVICE_INFO};
pub use host::{EntityHost, HostError, LogHost, MqttHost};
pub use lifecycle::{setup_entry, unload_entry, validate_credentials, Integration, SetupError};
pub use wizard::SetupWizard;
