//! Refresh coordinator
//!
//! Owns the API client and the most recent successful payload. The payload
//! is swapped atomically on each successful fetch and shared read-only with
//! every entity; a failed fetch keeps the previous payload but marks the
//! coordinator not ready until the next success.

use crate::api::{ClientError, UltrahumanClient};
use crate::entity::MetricEntity;
use crate::host::{publish_all, EntityHost};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use ultrahuman_core::RawPayload;

const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct RefreshState {
    data: Option<Arc<RawPayload>>,
    last_update_success: bool,
    last_refreshed: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Debug)]
pub struct RefreshCoordinator {
    client: UltrahumanClient,
    update_interval: Duration,
    state: RwLock<RefreshState>,
}

impl RefreshCoordinator {
    /// `update_interval` is raised to a small floor; a zero period would
    /// make the refresh loop spin.
    pub fn new(client: UltrahumanClient, update_interval: Duration) -> Self {
        Self {
            client,
            update_interval: update_interval.max(MIN_UPDATE_INTERVAL),
            state: RwLock::new(RefreshState::default()),
        }
    }

    /// Initial fetch performed during setup
    pub async fn first_refresh(&self) -> Result<(), ClientError> {
        info!("Performing first refresh");
        self.refresh().await
    }

    /// Run one refresh cycle
    pub async fn refresh(&self) -> Result<(), ClientError> {
        match self.client.fetch().await {
            Ok(payload) => {
                debug!(
                    "Refresh succeeded (day: {}, {} records)",
                    payload.day_key().unwrap_or("none"),
                    payload.day_records().len()
                );
                let mut state = self.state.write();
                state.data = Some(Arc::new(payload));
                state.last_update_success = true;
                state.last_refreshed = Some(Utc::now());
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!("Refresh failed: {}", e);
                let mut state = self.state.write();
                state.last_update_success = false;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Latest successfully fetched payload
    pub fn data(&self) -> Option<Arc<RawPayload>> {
        self.state.read().data.clone()
    }

    /// True when the last refresh succeeded
    pub fn is_ready(&self) -> bool {
        self.state.read().last_update_success
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_refreshed
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.clone()
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Start the periodic refresh loop.
    ///
    /// The first tick is skipped: setup has already refreshed. After every
    /// cycle, successful or not, all entity states are pushed to all hosts.
    pub fn spawn(
        self: &Arc<Self>,
        entities: Vec<MetricEntity>,
        hosts: Vec<Arc<dyn EntityHost>>,
    ) -> RefreshTask {
        let coordinator = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(coordinator.update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(
                "Refresh loop started (every {}s)",
                coordinator.update_interval.as_secs()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Failure is already recorded and logged by refresh()
                        let _ = coordinator.refresh().await;
                        publish_all(&entities, &hosts);
                    }
                    _ = &mut shutdown_rx => {
                        info!("Refresh loop stopped");
                        break;
                    }
                }
            }
        });

        RefreshTask {
            shutdown: Some(shutdown_tx),
            handle,
        }
    }
}

/// Handle on a running refresh loop
pub struct RefreshTask {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Signal the loop and wait for it; false if it had already died
    pub async fn stop(mut self) -> bool {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::entity::build_entities;
    use crate::host::testing::RecordingHost;
    use ultrahuman_devkit::{PayloadBuilder, TestHarness};

    fn coordinator_for(harness: &TestHarness, period: Duration) -> Arc<RefreshCoordinator> {
        let api = ApiConfig {
            base_url: harness.url(),
            ..ApiConfig::default()
        };
        let client = UltrahumanClient::new(&api, "tok").unwrap();
        Arc::new(RefreshCoordinator::new(client, period))
    }

    #[tokio::test]
    async fn test_not_ready_before_first_refresh() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today()).await.unwrap();
        let coordinator = coordinator_for(&harness, Duration::from_secs(60));

        assert!(!coordinator.is_ready());
        assert!(coordinator.data().is_none());
        assert!(coordinator.last_refreshed().is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_payload() {
        let harness = TestHarness::with_payload(&PayloadBuilder::new("2024-05-01").steps(100))
            .await
            .unwrap();
        let coordinator = coordinator_for(&harness, Duration::from_secs(60));

        coordinator.first_refresh().await.unwrap();
        let first = coordinator.data().unwrap();
        assert!(coordinator.is_ready());
        assert_eq!(first.day_key(), Some("2024-05-01"));

        harness.serve(&PayloadBuilder::new("2024-05-02").steps(200));
        coordinator.refresh().await.unwrap();
        let second = coordinator.data().unwrap();
        assert_eq!(second.day_key(), Some("2024-05-02"));
        // readers holding the old payload keep a consistent view
        assert_eq!(first.day_key(), Some("2024-05-01"));
    }

    #[tokio::test]
    async fn test_failure_keeps_payload_and_marks_not_ready() {
        let harness = TestHarness::with_payload(&PayloadBuilder::new("2024-05-01").steps(100))
            .await
            .unwrap();
        let coordinator = coordinator_for(&harness, Duration::from_secs(60));
        coordinator.first_refresh().await.unwrap();

        harness.fail_with(500);
        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500 }));
        assert!(!coordinator.is_ready());
        assert!(coordinator.last_error().unwrap().contains("500"));
        assert_eq!(coordinator.data().unwrap().day_key(), Some("2024-05-01"));

        harness.serve(&PayloadBuilder::new("2024-05-01").steps(150));
        coordinator.refresh().await.unwrap();
        assert!(coordinator.is_ready());
        assert!(coordinator.last_error().is_none());
    }

    #[tokio::test]
    async fn test_zero_interval_is_raised() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today()).await.unwrap();
        let coordinator = coordinator_for(&harness, Duration::ZERO);
        assert_eq!(coordinator.update_interval(), MIN_UPDATE_INTERVAL);

        let task = coordinator.spawn(Vec::new(), Vec::new());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(task.stop().await);
    }

    #[tokio::test]
    async fn test_failed_cycle_still_publishes_stale_states() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today().heart_rate(70))
            .await
            .unwrap();
        let coordinator = coordinator_for(&harness, Duration::from_millis(50));
        coordinator.first_refresh().await.unwrap();

        let recorder = Arc::new(RecordingHost::default());
        let hosts: Vec<Arc<dyn EntityHost>> = vec![recorder.clone()];
        harness.fail_with(500);
        let task = coordinator.spawn(build_entities("e", &coordinator), hosts);

        let mut published = false;
        for _ in 0..100 {
            if !recorder.published.lock().is_empty() {
                published = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(task.stop().await);
        assert!(published);

        let states = recorder.published.lock();
        assert!(states.iter().all(|s| !s.available));
        let hr = states.iter().find(|s| s.key == "hr_last").unwrap();
        assert_eq!(hr.value.as_ref().and_then(|v| v.as_i64()), Some(70));
    }

    #[tokio::test]
    async fn test_loop_refreshes_on_interval_and_stops() {
        let harness = TestHarness::with_payload(&PayloadBuilder::today().steps(1))
            .await
            .unwrap();
        let coordinator = coordinator_for(&harness, Duration::from_millis(50));

        let task = coordinator.spawn(Vec::new(), Vec::new());
        assert!(harness.wait_for_requests(2, 2000).await);
        assert!(coordinator.is_ready());

        assert!(task.stop().await);
        let seen = harness.endpoint.request_count();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(harness.endpoint.request_count(), seen);
    }
}
