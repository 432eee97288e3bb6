#![doc = include_str!("../README.md")]

pub mod collector;
pub mod config;
pub mod decoder;
pub mod error;
pub mod event;
pub mod metrics;
pub mod static_versions;
mod time;
pub mod variable_versions;

pub use collector::Collector;
pub use config::{CollectorConfig, SUPPORTED_VERSIONS};
pub use decoder::Decoder;
pub use error::{DecodeError, Error, Result};
pub use event::{DECODE_FAILURE_TAG, EventSink, FieldValue, FlowEvent, JsonLinesSink};
pub use metrics::{DecoderMetrics, DecoderMetricsSnapshot};
