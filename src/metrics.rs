//! Decoder counters for monitoring collector behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the decode pipeline.
///
/// All counters use atomic operations so a decoder shared by several worker
/// threads can record without additional locking. Warning-class conditions
/// (missing template, rejected template, length mismatch) are observable here
/// as well as in the log.
#[derive(Debug, Default)]
pub struct DecoderMetrics {
    /// Flow events emitted
    pub events: AtomicU64,
    /// Datagrams that produced a `_netflowdecodefailure` event
    pub decode_failures: AtomicU64,
    /// Templates compiled and cached
    pub templates_learned: AtomicU64,
    /// Templates discarded because a field could not be resolved
    pub templates_rejected: AtomicU64,
    /// Data flowsets skipped because no template was cached
    pub missing_template: AtomicU64,
    /// Data flowsets skipped because the payload did not fit the template
    pub length_mismatch: AtomicU64,
    /// Cache entries dropped by TTL expiry
    pub cache_expirations: AtomicU64,
}

impl DecoderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_events(&self, count: u64) {
        self.events.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_template_learned(&self) {
        self.templates_learned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_template_rejected(&self) {
        self.templates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_missing_template(&self) {
        self.missing_template.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_length_mismatch(&self) {
        self.length_mismatch.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cache_expirations(&self, count: u64) {
        self.cache_expirations.fetch_add(count, Ordering::Relaxed);
    }

    /// Get a consistent point-in-time copy of all counters.
    pub fn snapshot(&self) -> DecoderMetricsSnapshot {
        DecoderMetricsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            templates_learned: self.templates_learned.load(Ordering::Relaxed),
            templates_rejected: self.templates_rejected.load(Ordering::Relaxed),
            missing_template: self.missing_template.load(Ordering::Relaxed),
            length_mismatch: self.length_mismatch.load(Ordering::Relaxed),
            cache_expirations: self.cache_expirations.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.events.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
        self.templates_learned.store(0, Ordering::Relaxed);
        self.templates_rejected.store(0, Ordering::Relaxed);
        self.missing_template.store(0, Ordering::Relaxed);
        self.length_mismatch.store(0, Ordering::Relaxed);
        self.cache_expirations.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of [`DecoderMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderMetricsSnapshot {
    pub events: u64,
    pub decode_failures: u64,
    pub templates_learned: u64,
    pub templates_rejected: u64,
    pub missing_template: u64,
    pub length_mismatch: u64,
    pub cache_expirations: u64,
}
