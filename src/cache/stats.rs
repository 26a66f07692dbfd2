//! Cache Statistics Module
//!
//! Counters and gauges describing how the cache is being used.

use serde::Serialize;

/// Smoothing factor for the access latency moving average.
const LATENCY_ALPHA: f64 = 0.1;

// == Cache Stats ==
/// Snapshot-able usage counters. Counters only grow until `reset`; the
/// `total_*` gauges mirror the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live value
    pub hits: u64,
    /// Lookups for absent, expired or undecodable keys
    pub misses: u64,
    /// Number of entries removed under capacity pressure
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Live entry count
    pub total_entries: usize,
    /// Sum of stored payload sizes in bytes
    pub total_size_bytes: usize,
    /// Moving average of `get` latency in microseconds
    pub avg_access_latency_us: f64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Fraction of lookups that hit; 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    // == Recording ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Turns a previously recorded hit into a miss.
    pub fn reclassify_hit_as_miss(&mut self) {
        self.hits = self.hits.saturating_sub(1);
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Adds `count` TTL removals.
    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    /// Folds one `get` latency sample into the moving average.
    pub fn record_latency(&mut self, micros: f64) {
        if self.avg_access_latency_us == 0.0 {
            self.avg_access_latency_us = micros;
        } else {
            self.avg_access_latency_us =
                LATENCY_ALPHA * micros + (1.0 - LATENCY_ALPHA) * self.avg_access_latency_us;
        }
    }

    // == Update Gauges ==
    /// Updates the entry count and size gauges.
    pub fn set_totals(&mut self, entries: usize, size_bytes: usize) {
        self.total_entries = entries;
        self.total_size_bytes = size_bytes;
    }

    // == Reset ==
    /// Zeroes every counter. Gauges are left for the store to refresh.
    pub fn reset(&mut self) {
        let (entries, size) = (self.total_entries, self.total_size_bytes);
        *self = Self::default();
        self.set_totals(entries, size);
    }
}
