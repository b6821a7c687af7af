//! Map Metrics
//!
//! Lock-free counters shared by every map built from one context.

use std::sync::atomic::{AtomicU64, Ordering};

/// Map metrics collector
#[derive(Debug, Default)]
pub struct MapMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    durable_fetches: AtomicU64,
    stampede_waits: AtomicU64,
    cas_retries: AtomicU64,
    cache_errors: AtomicU64,
    durable_writes: AtomicU64,
}

impl MapMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_durable_fetch(&self) {
        self.durable_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_durable_write(&self) {
        self.durable_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stampede_wait(&self) {
        self.stampede_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cas_retry(&self) {
        self.cas_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn durable_fetches(&self) -> u64 {
        self.durable_fetches.load(Ordering::Relaxed)
    }

    pub fn stampede_waits(&self) -> u64 {
        self.stampede_waits.load(Ordering::Relaxed)
    }

    pub fn cas_retries(&self) -> u64 {
        self.cas_retries.load(Ordering::Relaxed)
    }

    pub fn cache_errors(&self) -> u64 {
        self.cache_errors.load(Ordering::Relaxed)
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        let hits = self.cache_hits() as f64;
        let total = hits + self.cache_misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            cache_hit_ratio: self.cache_hit_ratio(),
            durable_fetches: self.durable_fetches(),
            durable_writes: self.durable_writes.load(Ordering::Relaxed),
            stampede_waits: self.stampede_waits(),
            cas_retries: self.cas_retries(),
            cache_errors: self.cache_errors(),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_ratio: f64,
    pub durable_fetches: u64,
    pub durable_writes: u64,
    pub stampede_waits: u64,
    pub cas_retries: u64,
    pub cache_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let metrics = MapMetrics::new();
        assert_eq!(metrics.cache_hit_ratio(), 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        assert_eq!(metrics.cache_hit_ratio(), 0.75);
    }

    #[test]
    fn test_snapshot() {
        let metrics = MapMetrics::new();
        metrics.record_durable_fetch();
        metrics.record_stampede_wait();
        metrics.record_stampede_wait();
        metrics.record_cas_retry();
        metrics.record_cache_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.durable_fetches, 1);
        assert_eq!(snapshot.stampede_waits, 2);
        assert_eq!(snapshot.cas_retries, 1);
        assert_eq!(snapshot.cache_errors, 1);
        assert_eq!(snapshot.durable_writes, 0);
    }
}
