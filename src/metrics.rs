//! Deterministic, `BTreeMap`-backed cache metrics.
//!
//! This is the cache's only observability surface; it collects counters,
//! it does not log. `BTreeMap` is used instead of a `HashMap` for the same
//! reason the rest of this corpus gives for its own cache metrics: stable,
//! alphabetical key order makes snapshots comparable across runs and
//! deterministic in tests.

use std::collections::BTreeMap;

/// Running counters for a [`crate::cache::Cache`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetrics {
    /// Total `find` calls.
    pub requests: u64,
    /// `find` calls that returned `Some`.
    pub hits: u64,
    /// Bytes returned across all cache hits.
    pub bytes_served_from_cache: u64,
    /// Bytes copied into the cache across all successful inserts.
    pub bytes_written_to_cache: u64,
    /// Entries evicted to stay within the size budget.
    pub evictions: u64,
    /// Current `bytes_used`.
    pub cache_size_bytes: u64,
    /// The cache's configured `max_cache_size`.
    pub max_cache_size_bytes: u64,
}

impl CacheMetrics {
    pub(crate) fn new(max_cache_size_bytes: u64) -> Self {
        Self {
            max_cache_size_bytes,
            ..Default::default()
        }
    }

    pub(crate) fn record_hit(&mut self, size: u64) {
        self.requests += 1;
        self.hits += 1;
        self.bytes_served_from_cache += size;
    }

    pub(crate) fn record_miss(&mut self) {
        self.requests += 1;
    }

    pub(crate) fn record_insertion(&mut self, size: u64) {
        self.bytes_written_to_cache += size;
        self.cache_size_bytes += size;
    }

    pub(crate) fn record_eviction(&mut self, size: u64) {
        self.evictions += 1;
        self.cache_size_bytes -= size;
    }

    pub(crate) fn record_deletion(&mut self, size: u64) {
        self.cache_size_bytes -= size;
    }

    /// Fraction of `find` calls that were hits, or `0.0` with no requests yet.
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }

    /// `cache_size_bytes / max_cache_size_bytes`, or `0.0` if the budget is zero.
    pub fn utilization(&self) -> f64 {
        if self.max_cache_size_bytes == 0 {
            0.0
        } else {
            self.cache_size_bytes as f64 / self.max_cache_size_bytes as f64
        }
    }

    /// Snapshots every metric into a deterministically ordered map.
    pub fn to_btreemap(&self) -> BTreeMap<&'static str, f64> {
        let mut map = BTreeMap::new();
        map.insert("bytes_served_from_cache", self.bytes_served_from_cache as f64);
        map.insert("bytes_written_to_cache", self.bytes_written_to_cache as f64);
        map.insert("cache_size_bytes", self.cache_size_bytes as f64);
        map.insert("evictions", self.evictions as f64);
        map.insert("hit_rate", self.hit_rate());
        map.insert("hits", self.hits as f64);
        map.insert("max_cache_size_bytes", self.max_cache_size_bytes as f64);
        map.insert("requests", self.requests as f64);
        map.insert("utilization", self.utilization());
        map
    }
}
