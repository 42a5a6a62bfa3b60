/*!
Local read API

Read-only JSON view of the agent for dashboards and scripts:

- `GET /health`        refresh status of the coordinator
- `GET /entities`      every entity state, in registry order
- `GET /entities/{key}` one entity by metric key (404 if unknown)
- `GET /device`        device info all entities belong to
*/

use crate::coordinator::RefreshCoordinator;
use crate::entity::{render, DeviceInfo, EntityState, MetricEntity, DEVICE_INFO};
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use chrono::SecondsFormat;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RefreshCoordinator>,
    pub entities: Arc<Vec<MetricEntity>>,
}

#[derive(Debug, Serialize)]
struct HealthView {
    ready: bool,
    last_refreshed: Option<String>, // RFC3339
    last_error: Option<String>,
    day: Option<String>,
    entities: usize,
    update_interval_secs: u64,
}

fn health_view(app: &AppState) -> HealthView {
    let data = app.coordinator.data();
    HealthView {
        ready: app.coordinator.is_ready(),
        last_refreshed: app
            .coordinator
            .last_refreshed()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        last_error: app.coordinator.last_error(),
        day: data.as_ref().and_then(|d| d.day_key()).map(str::to_string),
        entities: app.entities.len(),
        update_interval_secs: app.coordinator.update_interval().as_secs(),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/entities", get(get_entities))
        .route("/entities/{key}", get(get_entity))
        .route("/device", get(get_device))
        .with_state(app_state)
}

/// Serve `router` on `bind` until `shutdown` resolves
pub async fn serve<F>(bind: &str, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind HTTP API on {}", bind))?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP API server failed")
}

// GET /health
async fn get_health(State(app): State<AppState>) -> Json<HealthView> {
    Json(health_view(&app))
}

// GET /entities
async fn get_entities(State(app): State<AppState>) -> Json<Vec<EntityState>> {
    Json(render(&app.entities))
}

// GET /entities/{key}
async fn get_entity(
    State(app): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<EntityState>, StatusCode> {
    let Some(entity) = app.entities.iter().find(|e| e.key() == key) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(entity.state()))
}

// GET /device
async fn get_device() -> Json<DeviceInfo> {
    Json(DEVICE_INFO)
}
