/*!
Test harness for the agent

Starts a stub endpoint preloaded with a payload and offers the waiting and
JSON-path assertions the agent's async tests need.
*/

use crate::payload_builder::PayloadBuilder;
use crate::stub_endpoint::{StubEndpoint, StubResponse};
use anyhow::Result;
use serde_json::Value;
use std::time::Duration;

/// Stub endpoint plus helpers
pub struct TestHarness {
    pub endpoint: StubEndpoint,
}

impl TestHarness {
    /// Harness serving `payload` wrapped in the API envelope
    pub async fn with_payload(payload: &PayloadBuilder) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging for tests

        let endpoint = StubEndpoint::start(StubResponse::json(payload.envelope())).await?;
        Ok(Self { endpoint })
    }

    /// Harness answering every request with `status`
    pub async fn with_status(status: u16) -> Result<Self> {
        env_logger::try_init().ok();

        let endpoint = StubEndpoint::start(StubResponse::status(status)).await?;
        Ok(Self { endpoint })
    }

    pub fn url(&self) -> String {
        self.endpoint.url()
    }

    /// Serve a new payload from now on
    pub fn serve(&self, payload: &PayloadBuilder) {
        self.endpoint.set_response(StubResponse::json(payload.envelope()));
    }

    /// Fail every request with `status` from now on
    pub fn fail_with(&self, status: u16) {
        self.endpoint.set_response(StubResponse::status(status));
    }

    /// Wait until the endpoint has seen at least `count` requests
    pub async fn wait_for_requests(&self, count: usize, timeout_ms: u64) -> bool {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.endpoint.request_count() >= count {
                log::info!("✅ Endpoint saw {} requests", count);
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        log::warn!("⏰ Timeout waiting for {} requests (saw {})", count, self.endpoint.request_count());
        false
    }

    /// Assert a dotted path in `value` equals `expected`
    pub fn assert_field_equals(value: &Value, field_path: &str, expected: &Value) -> Result<()> {
        match nested_field(value, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!(
                "Field '{}' mismatch: expected {:?}, got {:?}",
                field_path,
                expected,
                actual
            ),
            None => anyhow::bail!("Field '{}' not found", field_path),
        }
    }
}

/// Walk a dotted path (`a.b.0.c`) through objects and arrays
fn nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;

    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}
