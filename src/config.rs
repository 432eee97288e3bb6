//! Collector configuration.

use crate::error::{Error, Result};

use serde::Deserialize;

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Wire protocol versions this collector can decode.
pub const SUPPORTED_VERSIONS: [u16; 3] = [5, 9, 10];

/// Collector options. Deserializable so it can be embedded in a larger
/// configuration file; only `port` has no default.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// UDP port to listen on
    pub port: u16,
    /// Maximum datagram size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Decoder worker pool size
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bounded worker queue depth; the reader drops datagrams when full
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Template time-to-live in minutes, refreshed on every use
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Upper bound on cached templates across all exporters
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Name of the event field holding the decoded flow
    #[serde(default = "default_target")]
    pub target: String,
    /// Accepted NetFlow versions, any subset of {5, 9, 10}
    #[serde(default = "default_versions")]
    pub versions: Vec<u16>,
    /// Optional NetFlow V9 field definition override file
    #[serde(default)]
    pub netflow_definitions: Option<PathBuf>,
    /// Optional IPFIX field definition override file
    #[serde(default)]
    pub ipfix_definitions: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_buffer_size() -> usize {
    65536
}

fn default_workers() -> usize {
    2
}

fn default_queue_size() -> usize {
    2000
}

fn default_cache_ttl() -> u64 {
    4000
}

fn default_cache_size() -> usize {
    4096
}

fn default_target() -> String {
    "netflow".to_string()
}

fn default_versions() -> Vec<u16> {
    SUPPORTED_VERSIONS.to_vec()
}

impl CollectorConfig {
    /// All defaults, listening on the given port.
    pub fn new(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            buffer_size: default_buffer_size(),
            workers: default_workers(),
            queue_size: default_queue_size(),
            cache_ttl: default_cache_ttl(),
            cache_size: default_cache_size(),
            target: default_target(),
            versions: default_versions(),
            netflow_definitions: None,
            ipfix_definitions: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port is required".to_string()));
        }
        self.bind_addr()?;
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.queue_size == 0 {
            return Err(Error::Config("queue_size must be at least 1".to_string()));
        }
        if self.buffer_size < 2 {
            return Err(Error::Config(
                "buffer_size must hold at least a version field".to_string(),
            ));
        }
        if self.versions.is_empty() {
            return Err(Error::Config("versions must not be empty".to_string()));
        }
        if let Some(v) = self
            .versions
            .iter()
            .find(|v| !SUPPORTED_VERSIONS.contains(v))
        {
            return Err(Error::Config(format!("unsupported netflow version {v}")));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind address {:?}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The configured template TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl.saturating_mul(60))
    }

    pub fn version_set(&self) -> HashSet<u16> {
        self.versions.iter().copied().collect()
    }
}
