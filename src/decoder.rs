//! PDU parsing entry point.
//!
//! A [`Decoder`] owns the field catalogs, the shared template cache and the
//! decode counters. It is immutable apart from the cache's interior mutex,
//! so one instance is shared by every worker thread.

use crate::config::CollectorConfig;
use crate::error::{DecodeError, Result};
use crate::event::FlowEvent;
use crate::metrics::{DecoderMetrics, DecoderMetricsSnapshot};
use crate::static_versions::v5;
use crate::variable_versions::cache::TemplateCache;
use crate::variable_versions::catalog::{FieldCatalog, IpfixCatalog};
use crate::variable_versions::{ipfix, v9};

use log::warn;

use std::collections::HashSet;
use std::net::SocketAddr;

#[derive(Debug)]
pub struct Decoder {
    pub(crate) v9_catalog: FieldCatalog,
    pub(crate) ipfix_catalog: IpfixCatalog,
    pub(crate) templates: TemplateCache,
    pub(crate) metrics: DecoderMetrics,
    pub(crate) allowed_versions: HashSet<u16>,
    /// Name of the event field holding the decoded flow
    pub(crate) container: String,
}

impl Decoder {
    /// Loads the field catalogs (defaults plus any configured overrides) and
    /// sets up an empty template cache. Catalog problems are fatal here;
    /// nothing else about a decoder can fail at startup.
    pub fn new(config: &CollectorConfig) -> Result<Self> {
        let v9_catalog = FieldCatalog::load(config.netflow_definitions.as_deref())?;
        let ipfix_catalog = IpfixCatalog::load(config.ipfix_definitions.as_deref())?;
        Ok(Self {
            v9_catalog,
            ipfix_catalog,
            templates: TemplateCache::new(config.ttl(), config.cache_size),
            metrics: DecoderMetrics::new(),
            allowed_versions: config.version_set(),
            container: config.target.clone(),
        })
    }

    pub fn metrics(&self) -> DecoderMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn template_cache(&self) -> &TemplateCache {
        &self.templates
    }

    /// Decodes one datagram into flow events.
    ///
    /// Never fails: an unacceptable version or malformed payload yields a
    /// single `_netflowdecodefailure` tagged event carrying the reason, and
    /// the datagram is dropped. Warning-class conditions inside a well
    /// formed datagram (missing template, payload/width mismatch) skip the
    /// affected flowset only.
    pub fn decode(&self, payload: &[u8], peer: SocketAddr) -> Vec<FlowEvent> {
        match self.decode_inner(payload, peer) {
            Ok(events) => {
                self.metrics.record_events(events.len() as u64);
                events
            }
            Err(e) => {
                warn!("dropping datagram from {peer}: {e}");
                self.metrics.record_decode_failure();
                vec![FlowEvent::decode_failure(
                    peer.ip(),
                    &self.container,
                    format!("Failed to decode netflow datagram from {}: {e}", peer.ip()),
                )]
            }
        }
    }

    fn decode_inner(
        &self,
        payload: &[u8],
        peer: SocketAddr,
    ) -> std::result::Result<Vec<FlowEvent>, DecodeError> {
        if payload.len() < 2 {
            return Err(DecodeError::Truncated("netflow version"));
        }
        let version = u16::from_be_bytes([payload[0], payload[1]]);
        if !self.allowed_versions.contains(&version) {
            return Err(DecodeError::UnknownVersion(version));
        }
        match version {
            v5::VERSION => v5::decode(self, payload, peer),
            v9::VERSION => v9::decode(self, payload, peer),
            ipfix::VERSION => ipfix::decode(self, payload, peer),
            other => Err(DecodeError::UnknownVersion(other)),
        }
    }
}
