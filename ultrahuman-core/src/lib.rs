//! Ultrahuman Core - metric registry and payload parser
//!
//! Turns the partner API's daily-metrics document into flat, typed values:
//! - `registry`: the ordered table of exposed metrics (label, icon, unit, classes)
//! - `payload`: read-only view over one poll's raw JSON document
//! - `parser`: per-metric lookup with absence handling and epoch conversion
//! - `value`: the extracted scalar handed to entity hosts

pub mod parser;
pub mod payload;
pub mod registry;
pub mod value;

pub use parser::{epoch_to_iso, resolve, PayloadParser};
pub use payload::RawPayload;
pub use registry::{find_metric, metrics, DeviceClass, MetricDefinition, StateClass, METRICS};
pub use value::MetricValue;
