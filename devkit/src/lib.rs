/*!
# Ultrahuman DevKit - Stubs and fixtures for development

Library that makes the agent testable without the real partner API:
- Stub of the daily-metrics endpoint (records every request)
- Builders for partner API payloads
- A small harness tying both together for async tests
*/

pub mod payload_builder;
pub mod stub_endpoint;
pub mod test_utils;

pub use payload_builder::PayloadBuilder;
pub use stub_endpoint::{RecordedRequest, StubEndpoint, StubResponse, DAILY_METRICS_PATH};
pub use test_utils::TestHarness;
