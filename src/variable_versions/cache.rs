//! Exporter-scoped template cache with sliding TTL.
//!
//! Template ids are only unique within an exporter, and the same id may be
//! redefined by different observation domains on one host. Entries are
//! therefore keyed by the full `(source id, template id, host, port)` tuple.
//! Reads refresh the entry's timestamp, so operational templates stay cached
//! indefinitely while silent exporters age out. Expired entries are pruned
//! lazily on access and opportunistically on every insert; no background
//! timer exists.

use crate::variable_versions::template::{Template, TemplateId};

use lru::LruCache;

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Identity of a template within one exporter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    /// V9 Source ID or IPFIX Observation Domain ID
    pub source_id: u32,
    pub template_id: TemplateId,
    pub host: IpAddr,
    pub port: u16,
}

impl TemplateKey {
    pub fn new(source_id: u32, template_id: TemplateId, exporter: SocketAddr) -> Self {
        Self {
            source_id,
            template_id,
            host: exporter.ip(),
            port: exporter.port(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    template: Arc<Template>,
    refreshed_at: Instant,
}

/// The sole shared mutable state of the decode pipeline. A single coarse
/// mutex is enough: the cache is write-rare and read-frequent, and lookups
/// are cheap (`Arc` clone out). A `put` from one worker is visible to
/// subsequent `get`s from all workers.
pub struct TemplateCache {
    inner: Mutex<LruCache<TemplateKey, CacheEntry>>,
    ttl: Duration,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish()
    }
}

impl TemplateCache {
    /// `capacity` bounds the number of cached templates across all
    /// exporters; the least recently used entry is evicted beyond it.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Inserts or replaces a template, then sweeps expired entries.
    /// Returns the number of entries the sweep removed.
    pub fn put(&self, key: TemplateKey, template: Template) -> usize {
        let mut inner = self.lock();
        let swept = sweep_expired(&mut inner, self.ttl);
        inner.put(
            key,
            CacheEntry {
                template: Arc::new(template),
                refreshed_at: Instant::now(),
            },
        );
        swept
    }

    /// Returns the template if present and unexpired, refreshing its TTL
    /// window. An expired entry is dropped and reported as a miss.
    pub fn get(&self, key: &TemplateKey) -> Option<Arc<Template>> {
        let mut inner = self.lock();
        let expired = matches!(
            inner.peek(key),
            Some(entry) if entry.refreshed_at.elapsed() >= self.ttl
        );
        if expired {
            inner.pop(key);
            return None;
        }
        let entry = inner.get_mut(key)?;
        entry.refreshed_at = Instant::now();
        Some(Arc::clone(&entry.template))
    }

    /// Removes every entry that has outlived the TTL since its last
    /// refresh. Returns the number removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&mut self.lock(), self.ttl)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<TemplateKey, CacheEntry>> {
        // A worker that panicked mid-insert cannot leave a template half
        // written, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sweep_expired(cache: &mut LruCache<TemplateKey, CacheEntry>, ttl: Duration) -> usize {
    let expired: Vec<TemplateKey> = cache
        .iter()
        .filter(|(_, entry)| entry.refreshed_at.elapsed() >= ttl)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        cache.pop(key);
    }
    expired.len()
}
