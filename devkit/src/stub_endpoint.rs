/*!
Stub of the partner daily-metrics endpoint

Serves a configurable response on `127.0.0.1:<random port>` and records every
request it receives (query date, auth and accept headers) so tests can assert
on what the client actually sent.
*/

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Path served by the stub, mirroring the partner API
pub const DAILY_METRICS_PATH: &str = "/api/v1/partner/daily_metrics";

/// Canned response returned for every request
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub body: String,
    pub delay: Option<Duration>,
}

impl StubResponse {
    /// 200 with the given JSON body
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            delay: None,
        }
    }

    /// Error status with a small JSON error body
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": "stub error", "status": status }).to_string(),
            delay: None,
        }
    }

    /// 200 with an arbitrary (possibly non-JSON) body
    pub fn raw<S: Into<String>>(body: S) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// What the stub saw for one request
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub date: Option<String>,
    pub authorization: Option<String>,
    pub accept: Option<String>,
}

struct StubState {
    response: Mutex<StubResponse>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Running stub server; stops when dropped
pub struct StubEndpoint {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl StubEndpoint {
    /// Bind a random local port and start serving `response`
    pub async fn start(response: StubResponse) -> Result<Self> {
        let state = Arc::new(StubState {
            response: Mutex::new(response),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route(DAILY_METRICS_PATH, get(daily_metrics))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("❌ [STUB] server stopped: {}", e);
            }
        });

        log::info!("🧪 [STUB] daily_metrics listening on {}", addr);
        Ok(Self { addr, state, server })
    }

    /// Full URL of the stubbed endpoint
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, DAILY_METRICS_PATH)
    }

    /// Replace the canned response for subsequent requests
    pub fn set_response(&self, response: StubResponse) {
        *self.state.response.lock().unwrap() = response;
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().unwrap().last().cloned()
    }
}

impl Drop for StubEndpoint {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn daily_metrics(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    state.requests.lock().unwrap().push(RecordedRequest {
        date: params.get("date").cloned(),
        authorization: header_value(header::AUTHORIZATION),
        accept: header_value(header::ACCEPT),
    });
    log::info!("📨 [STUB] request for date {:?}", params.get("date"));

    let response = state.response.lock().unwrap().clone();
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], response.body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_records_requests() {
        let stub = StubEndpoint::start(StubResponse::status(401)).await.unwrap();
        assert!(stub.url().ends_with(DAILY_METRICS_PATH));
        assert_eq!(stub.request_count(), 0);

        stub.set_response(StubResponse::json(serde_json::json!({ "data": {} })));
        assert_eq!(stub.state.response.lock().unwrap().status, 200);
    }
}
