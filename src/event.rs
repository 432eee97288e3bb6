//! Flow events and the sink they are delivered to.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use std::collections::BTreeMap;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Tag attached to the single event emitted for a datagram that could not be
/// decoded.
pub const DECODE_FAILURE_TAG: &str = "_netflowdecodefailure";

/// A decoded field value.
///
/// The set of variants is closed: templates compile down to unsigned
/// integers, addresses, MAC addresses and strings. Synthesized ISO-8601
/// timestamps are carried as [`FieldValue::Str`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    UInt(u64),
    Str(String),
    Ip4Addr(Ipv4Addr),
    Ip6Addr(Ipv6Addr),
    MacAddr(String),
}

/// One flow record (or decode failure) as handed to the event sink.
///
/// Serializes as
/// `{"@timestamp": ..., "host": ..., "<container>": { ...fields }}` with
/// `tags` and `message` present only on decode failures. The container name
/// comes from the `target` configuration option.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEvent {
    /// Protocol-chosen timestamp (export time or header unix seconds)
    pub timestamp: DateTime<Utc>,
    /// Exporter address the datagram came from
    pub host: IpAddr,
    pub tags: Vec<String>,
    /// Human readable description, set on decode failures
    pub message: Option<String>,
    /// Name of the container field holding the decoded flow
    pub container: String,
    pub fields: BTreeMap<String, FieldValue>,
}

impl FlowEvent {
    pub fn new(timestamp: DateTime<Utc>, host: IpAddr, container: &str) -> Self {
        Self {
            timestamp,
            host,
            tags: Vec::new(),
            message: None,
            container: container.to_string(),
            fields: BTreeMap::new(),
        }
    }

    /// The single event reported for an undecodable datagram.
    pub fn decode_failure(host: IpAddr, container: &str, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            host,
            tags: vec![DECODE_FAILURE_TAG.to_string()],
            message: Some(message),
            container: container.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_decode_failure(&self) -> bool {
        self.tags.iter().any(|t| t == DECODE_FAILURE_TAG)
    }
}

impl Serialize for FlowEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(
            "@timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        )?;
        map.serialize_entry("host", &self.host)?;
        if !self.tags.is_empty() {
            map.serialize_entry("tags", &self.tags)?;
        }
        if let Some(message) = &self.message {
            map.serialize_entry("message", message)?;
        }
        map.serialize_entry(&self.container, &self.fields)?;
        map.end()
    }
}

/// Downstream consumer of decoded events.
///
/// Implementations must tolerate concurrent `emit` calls from every worker
/// thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: FlowEvent);
}

/// Writes one JSON object per line to stdout. Used by the collector binary.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

impl JsonLinesSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: FlowEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut out = std::io::stdout().lock();
                if writeln!(out, "{line}").is_err() {
                    log::error!("failed to write event to stdout");
                }
            }
            Err(e) => log::error!("failed to serialize event: {e}"),
        }
    }
}
