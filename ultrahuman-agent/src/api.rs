//! Client for the Ultrahuman partner API
//!
//! One GET per refresh against the daily-metrics endpoint. No internal
//! retries: the refresh coordinator decides what a failure means.

use crate::config::ApiConfig;
use chrono::{Local, NaiveDate};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::fmt;
use std::time::Duration;
use tracing::debug;
use ultrahuman_core::RawPayload;

/// Transport-level failure of a fetch
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("API returned HTTP {status}")]
    Status { status: u16 },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Token rejected by the API
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ClientError::Status { status: 401 | 403 })
    }
}

#[derive(Clone)]
pub struct UltrahumanClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl fmt::Debug for UltrahumanClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UltrahumanClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UltrahumanClient {
    /// Build a client carrying a fixed token
    pub fn new(api: &ApiConfig, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ultrahuman-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Transport)?;

        Ok(Self {
            http,
            base_url: api.base_url.clone(),
            token: token.into(),
            timeout: api.timeout(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch today's metrics (caller's local date)
    pub async fn fetch(&self) -> Result<RawPayload, ClientError> {
        self.fetch_for(Local::now().date_naive()).await
    }

    /// Fetch the metrics document for an explicit date
    pub async fn fetch_for(&self, date: NaiveDate) -> Result<RawPayload, ClientError> {
        let date = date.format("%Y-%m-%d").to_string();
        debug!("Fetching daily metrics for {}", date);

        let response = self
            .http
            .get(&self.base_url)
            .query(&[("date", date.as_str())])
            .header(AUTHORIZATION, self.token.as_str())
            .header(ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let document: serde_json::Value =
            serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(RawPayload::from_envelope(document))
    }

    /// One fetch attempt, reduced to success/failure
    pub async fn validate(&self) -> bool {
        match self.fetch().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Token validation failed: {}", e);
                false
            }
        }
    }

    fn classify(&self, error: reqwest::Error) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout(self.timeout)
        } else {
            ClientError::Transport(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultrahuman_core::resolve;
    use ultrahuman_devkit::{PayloadBuilder, StubEndpoint, StubResponse};

    fn api_for(stub: &StubEndpoint) -> ApiConfig {
        ApiConfig {
            base_url: stub.url(),
            ..ApiConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_date_and_headers() {
        let payload = PayloadBuilder::new("2024-05-01").time_zone("UTC").heart_rate(62);
        let stub = StubEndpoint::start(StubResponse::json(payload.envelope())).await.unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "tok-123").unwrap();

        let raw = client.fetch().await.unwrap();
        assert_eq!(raw.day_key(), Some("2024-05-01"));
        assert_eq!(resolve(Some(&raw), "hr_last").and_then(|v| v.as_i64()), Some(62));

        let request = stub.last_request().unwrap();
        let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(request.date.as_deref(), Some(today.as_str()));
        assert_eq!(request.authorization.as_deref(), Some("tok-123"));
        assert_eq!(request.accept.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_fetch_for_explicit_date() {
        let stub = StubEndpoint::start(StubResponse::json(PayloadBuilder::without_days().envelope()))
            .await
            .unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "tok").unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let raw = client.fetch_for(date).await.unwrap();
        assert!(raw.is_empty());
        assert_eq!(stub.last_request().unwrap().date.as_deref(), Some("2024-01-02"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_a_status_error() {
        let stub = StubEndpoint::start(StubResponse::status(401)).await.unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "bad").unwrap();

        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 401 }));
        assert!(err.is_auth_rejection());
        assert!(!client.validate().await);
    }

    #[tokio::test]
    async fn test_server_error_is_not_auth_rejection() {
        let stub = StubEndpoint::start(StubResponse::status(503)).await.unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "tok").unwrap();

        let err = client.fetch().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 503 }));
        assert!(!err.is_auth_rejection());
    }

    #[tokio::test]
    async fn test_non_json_body_is_decode_error() {
        let stub = StubEndpoint::start(StubResponse::raw("<html>maintenance</html>")).await.unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "tok").unwrap();

        assert!(matches!(client.fetch().await, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn test_missing_data_member_gives_empty_payload() {
        let stub = StubEndpoint::start(StubResponse::json(serde_json::json!({ "status": "ok" })))
            .await
            .unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "tok").unwrap();

        assert!(client.fetch().await.unwrap().is_empty());
        assert!(client.validate().await);
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let response = StubResponse::json(PayloadBuilder::today().envelope())
            .with_delay(Duration::from_millis(500));
        let stub = StubEndpoint::start(response).await.unwrap();
        let client = UltrahumanClient::new(&api_for(&stub), "tok")
            .unwrap()
            .with_timeout(Duration::from_millis(50));

        assert!(matches!(client.fetch().await, Err(ClientError::Timeout(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = UltrahumanClient::new(&ApiConfig::default(), "very-secret").unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("very-secret"));
        assert_eq!(client.timeout(), Duration::from_secs(15));
    }
}
