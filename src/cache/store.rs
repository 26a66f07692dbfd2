//! Cache Store Module
//!
//! Main cache engine: payload map with TTL expiry, tag invalidation,
//! policy-driven eviction under entry and size caps, and an optional
//! persistence mirror.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::cache::{
    heuristic_priority, clamp_priority, CacheEntry, CacheStats, Clock, Payload, SetOptions,
    SystemClock,
};
use crate::config::CacheConfig;
use crate::persistence::PersistenceHandle;

// == Cache Store ==
/// Payload-level cache storage. See [`crate::cache::Cache`] for the typed API.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Capacity, TTL and eviction settings
    config: CacheConfig,
    /// Time source
    clock: Arc<dyn Clock>,
    /// Performance statistics
    stats: CacheStats,
    /// Sum of `size_bytes` over all entries
    total_size: usize,
    /// Logical counter ordering inserts and accesses
    tick: u64,
    /// Persistence mirror, if attached
    persistence: Option<PersistenceHandle>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new store on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a new store on the given clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            clock,
            stats: CacheStats::new(),
            total_size: 0,
            tick: 0,
            persistence: None,
        }
    }

    /// Mirrors subsequent writes and deletes through `handle`.
    pub fn attach_persistence(&mut self, handle: PersistenceHandle) {
        self.persistence = Some(handle);
    }

    pub fn persistence(&self) -> Option<&PersistenceHandle> {
        self.persistence.as_ref()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Get ==
    /// Retrieves a payload by key.
    ///
    /// Missing and expired keys count as misses; expired entries are removed.
    pub fn get(&mut self, key: &str) -> Option<Payload> {
        let started = Instant::now();
        let now = self.now();

        let expired = match self.entries.get(key) {
            None => {
                self.stats.record_miss();
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            if let Some(entry) = self.remove_entry(key) {
                self.mirror_remove(&entry);
            }
            self.stats.record_expirations(1);
            self.stats.record_miss();
            debug!("Lazily expired key '{}'", key);
            return None;
        }

        let touch = self.next_tick();
        let payload = self.entries.get_mut(key).map(|entry| {
            entry.record_access(now, touch);
            entry.payload.clone()
        });

        self.stats.record_hit();
        self.stats
            .record_latency(started.elapsed().as_secs_f64() * 1_000_000.0);
        payload
    }

    /// Live entry for `key` without touching access metadata or stats.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        let now = self.now();
        self.entries.get(key).filter(|e| !e.is_expired(now))
    }

    /// True if `key` holds a live entry. Does not count as an access.
    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    // == Set ==
    /// Stores a payload, replacing any existing entry for `key`.
    ///
    /// May evict other entries before returning.
    pub fn set(&mut self, key: impl Into<String>, payload: Payload, options: &SetOptions) {
        let now = self.now();
        let ttl_ms = options.ttl_ms.unwrap_or(self.config.default_ttl_ms);
        let priority = options
            .priority
            .map(clamp_priority)
            .unwrap_or_else(|| heuristic_priority(payload.size_bytes()));
        let tags: BTreeSet<String> = options.tags.iter().cloned().collect();

        let mut entry = CacheEntry::new(key, payload, ttl_ms, tags, priority, now);
        entry.persist = options.persist;
        self.admit(entry, true);
    }

    /// Re-admits entries loaded from persistence, most recently used last.
    ///
    /// Returns how many of them are still held once capacity is enforced.
    pub fn restore(&mut self, entries: impl IntoIterator<Item = CacheEntry>) -> usize {
        let now = self.now();
        let mut entries: Vec<CacheEntry> = entries
            .into_iter()
            .filter(|e| !e.is_expired(now))
            .collect();
        entries.sort_by(|a, b| {
            a.last_accessed_at
                .cmp(&b.last_accessed_at)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.key.cmp(&b.key))
        });

        let keys: Vec<String> = entries.iter().map(|e| e.key.clone()).collect();
        for entry in entries {
            self.admit(entry, false);
        }
        keys.iter()
            .filter(|key| self.entries.contains_key(key.as_str()))
            .count()
    }

    fn admit(&mut self, mut entry: CacheEntry, mirror: bool) {
        let previous = self.remove_entry(&entry.key);
        self.ensure_capacity(entry.size_bytes);

        let tick = self.next_tick();
        entry.seq = tick;
        entry.touch = tick;

        if let Some(handle) = &self.persistence {
            if entry.persist && mirror {
                handle.save(&entry);
            } else if !entry.persist && previous.map_or(false, |p| p.persist) {
                handle.remove(&entry.key);
            }
        }

        self.total_size += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);
        self.refresh_totals();
    }

    // == Capacity ==
    /// Frees room for an incoming entry of `incoming_size` bytes.
    ///
    /// Capacity is a soft target: if nothing is left to evict the incoming
    /// entry is admitted anyway.
    fn ensure_capacity(&mut self, incoming_size: usize) {
        if !self.over_capacity(incoming_size) {
            return;
        }

        self.cleanup_expired();
        if !self.over_capacity(incoming_size) {
            return;
        }

        let now = self.now();
        let victims = self.config.eviction_policy.rank(self.entries.values(), now);

        let mut evicted = 0usize;
        for key in victims {
            if !self.over_capacity(incoming_size) {
                break;
            }
            if let Some(entry) = self.remove_entry(&key) {
                self.mirror_remove(&entry);
                self.stats.record_eviction();
                evicted += 1;
                debug!(
                    "Evicted key '{}' ({} bytes, {} accesses)",
                    key, entry.size_bytes, entry.access_count
                );
            }
        }

        if evicted > 0 {
            info!(
                "Evicted {} entries under {} policy ({} entries, {} bytes remain)",
                evicted,
                self.config.eviction_policy.name(),
                self.entries.len(),
                self.total_size
            );
        }
    }

    fn over_capacity(&self, incoming_size: usize) -> bool {
        self.entries.len() + 1 > self.config.max_entries
            || self.total_size + incoming_size > self.config.max_size_bytes
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.remove_entry(key) {
            Some(entry) => {
                self.mirror_remove(&entry);
                self.refresh_totals();
                true
            }
            None => false,
        }
    }

    /// Removes every entry carrying any of `tags`. Returns the number removed.
    pub fn delete_by_tags<I, S>(&mut self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        if tags.is_empty() {
            return 0;
        }

        let keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.has_any_tag(&tags))
            .map(|e| e.key.clone())
            .collect();

        for key in &keys {
            if let Some(entry) = self.remove_entry(key) {
                self.mirror_remove(&entry);
            }
        }
        self.refresh_totals();

        if !keys.is_empty() {
            info!("Invalidated {} entries by tags {:?}", keys.len(), tags);
        }
        keys.len()
    }

    /// Drops an entry whose payload could not be decoded, turning the hit that
    /// returned it into a miss.
    pub fn discard_corrupt(&mut self, key: &str) {
        if self.delete(key) {
            self.stats.reclassify_hit_as_miss();
        }
    }

    // == Clear ==
    /// Removes every entry, clears persistence and resets statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
        self.stats = CacheStats::new();
        if let Some(handle) = &self.persistence {
            handle.clear();
        }
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_totals(self.entries.len(), self.total_size);
        stats
    }

    /// Zeroes counters without touching entries.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
        self.refresh_totals();
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.now();
        let expired_keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired_keys {
            if let Some(entry) = self.remove_entry(key) {
                self.mirror_remove(&entry);
            }
        }

        self.stats.record_expirations(expired_keys.len());
        self.refresh_totals();
        expired_keys.len()
    }

    // == Length ==
    /// Returns the current number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of stored payload sizes.
    pub fn total_size_bytes(&self) -> usize {
        self.total_size
    }

    /// Keys of all entries, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    // == Internals ==
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn mirror_remove(&self, entry: &CacheEntry) {
        if let (Some(handle), true) = (&self.persistence, entry.persist) {
            handle.remove(&entry.key);
        }
    }

    fn refresh_totals(&mut self) {
        self.stats.set_totals(self.entries.len(), self.total_size);
    }
}
