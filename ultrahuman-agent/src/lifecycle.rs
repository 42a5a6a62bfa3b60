//! Setup and teardown of one configured entry

use crate::api::{ClientError, UltrahumanClient};
use crate::config::{AgentConfig, ApiConfig, ConfigError};
use crate::coordinator::{RefreshCoordinator, RefreshTask};
use crate::entity::{build_entities, render, EntityState, MetricEntity};
use crate::host::{publish_all, register_all, EntityHost, HostError};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("invalid_auth")]
    InvalidAuth,
    #[error("Not ready: {0}")]
    NotReady(#[source] ClientError),
    #[error("Entity host failed: {0}")]
    Host(#[from] HostError),
}

/// A running entry: coordinator, its entities and the refresh loop
pub struct Integration {
    coordinator: Arc<RefreshCoordinator>,
    entities: Arc<Vec<MetricEntity>>,
    hosts: Vec<Arc<dyn EntityHost>>,
    task: RefreshTask,
}

impl Integration {
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn entities(&self) -> &Arc<Vec<MetricEntity>> {
        &self.entities
    }

    pub fn states(&self) -> Vec<EntityState> {
        render(&self.entities)
    }
}

/// Validate config, perform the first refresh, register entities with
/// every host and start the refresh loop.
pub async fn setup_entry(
    config: &AgentConfig,
    hosts: Vec<Arc<dyn EntityHost>>,
) -> Result<Integration, SetupError> {
    config.validate()?;
    let token = config.api.token.as_deref().ok_or(ConfigError::MissingToken)?;

    let client = UltrahumanClient::new(&config.api, token).map_err(SetupError::NotReady)?;
    let coordinator = Arc::new(RefreshCoordinator::new(client, config.update_interval()));

    if let Err(e) = coordinator.first_refresh().await {
        return Err(if e.is_auth_rejection() {
            SetupError::InvalidAuth
        } else {
            SetupError::NotReady(e)
        });
    }

    let entities = build_entities(&config.entry.entry_id, &coordinator);
    register_all(&entities, &hosts)?;
    publish_all(&entities, &hosts);

    let task = coordinator.spawn(entities.clone(), hosts.clone());

    info!(
        "Entry '{}' set up with {} entities",
        config.entry.title,
        entities.len()
    );

    Ok(Integration {
        coordinator,
        entities: Arc::new(entities),
        hosts,
        task,
    })
}

/// Stop the refresh loop and release the hosts
pub async fn unload_entry(integration: Integration) -> bool {
    let Integration { hosts, task, .. } = integration;

    let stopped = task.stop().await;
    for host in &hosts {
        if let Err(e) = host.shutdown() {
            warn!("Host '{}' failed to shut down: {}", host.name(), e);
        }
    }

    info!("Entry unloaded");
    stopped
}

/// One fetch with the candidate token; any failure counts as rejected
pub async fn validate_credentials(api: &ApiConfig, token: &str) -> Result<(), SetupError> {
    let client = UltrahumanClient::new(api, token).map_err(SetupError::NotReady)?;
    if client.validate().await {
        Ok(())
    } else {
        Err(SetupError::InvalidAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::RecordingHost;
    use ultrahuman_devkit::{PayloadBuilder, TestHarness};

    fn config_for(harness: &TestHarness) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.api.base_url = harness.url();
        config.api.token = Some("tok".into());
        config.entry.entry_id = "entry".into();
        config
    }

    #[tokio::test]
    async fn test_setup_registers_and_publishes() {
        let harness = TestHarness::with_payload(&PayloadBuilder::full_day("2024-01-02"))
            .await
            .unwrap();
        let recorder = Arc::new(RecordingHost::default());

        let integration = setup_entry(&config_for(&harness), vec![recorder.clone() as Arc<dyn EntityHost>])
            .await
            .unwrap();

        assert!(integration.coordinator().is_ready());
        assert_eq!(recorder.registered.lock().len(), integration.entities().len());
        assert_eq!(recorder.published.lock().len(), integration.entities().len());
        assert_eq!(recorder.registered.lock()[0].unique_id, "entry_hr_last");

        assert!(unload_entry(integration).await);
        assert!(*recorder.shut_down.lock());
    }

    #[tokio::test]
    async fn test_missing_token_is_invalid_config() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today()).await.unwrap();
        let mut config = config_for(&harness);
        config.api.token = None;

        let result = setup_entry(&config, Vec::new()).await;
        assert!(matches!(
            result,
            Err(SetupError::InvalidConfig(ConfigError::MissingToken))
        ));
        assert_eq!(harness.endpoint.request_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_token_is_invalid_auth() {
        let harness = TestHarness::with_status(403).await.unwrap();
        let result = setup_entry(&config_for(&harness), Vec::new()).await;
        assert!(matches!(result, Err(SetupError::InvalidAuth)));
    }

    #[tokio::test]
    async fn test_server_error_is_not_ready() {
        let harness = TestHarness::with_status(502).await.unwrap();
        let recorder = Arc::new(RecordingHost::default());

        let result = setup_entry(&config_for(&harness), vec![recorder.clone() as Arc<dyn EntityHost>]).await;
        assert!(matches!(
            result,
            Err(SetupError::NotReady(ClientError::Status { status: 502 }))
        ));
        assert!(recorder.registered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_validate_credentials() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today()).await.unwrap();
        let api = ApiConfig {
            base_url: harness.url(),
            ..ApiConfig::default()
        };
        assert!(validate_credentials(&api, "tok").await.is_ok());

        harness.fail_with(401);
        assert!(matches!(
            validate_credentials(&api, "bad").await,
            Err(SetupError::InvalidAuth)
        ));
    }
}
