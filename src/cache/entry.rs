//! Cache Entry Module
//!
//! Defines individual cache entries, their stored payload and the options
//! accepted by `set`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// == Payload ==
/// Encoded form of a cached value.
///
/// `data` is the codec output, or a base64 string of its zstd-compressed
/// bytes when `compressed` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub data: String,
    #[serde(default)]
    pub compressed: bool,
}

impl Payload {
    /// Creates an uncompressed payload.
    pub fn raw(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            compressed: false,
        }
    }

    /// Approximate stored size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

// == Cache Entry ==
/// Represents a single cache entry with payload and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: String,
    /// The stored payload
    pub payload: Payload,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last successful read or write (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Time to live in milliseconds, measured from `created_at`
    pub ttl_ms: u64,
    /// Number of successful reads
    pub access_count: u64,
    /// Stored payload size, recomputed whenever the payload changes
    pub size_bytes: usize,
    /// Group invalidation labels
    pub tags: BTreeSet<String>,
    /// Keep-worthiness in `[0, 1]`, higher stays longer
    pub priority: f64,
    /// Whether the entry is mirrored to persistence
    pub persist: bool,
    /// Insertion order within the owning store
    pub(crate) seq: u64,
    /// Access order within the owning store
    pub(crate) touch: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry at time `now`.
    pub fn new(
        key: impl Into<String>,
        payload: Payload,
        ttl_ms: u64,
        tags: BTreeSet<String>,
        priority: f64,
        now: u64,
    ) -> Self {
        let size_bytes = payload.size_bytes();
        Self {
            key: key.into(),
            payload,
            created_at: now,
            last_accessed_at: now,
            ttl_ms,
            access_count: 0,
            size_bytes,
            tags,
            priority: clamp_priority(priority),
            persist: true,
            seq: 0,
            touch: 0,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at time `now`.
    ///
    /// Boundary condition: an entry is expired once `now - created_at >= ttl_ms`,
    /// so a zero TTL is expired immediately.
    pub fn is_expired(&self, now: u64) -> bool {
        self.age_ms(now) >= self.ttl_ms
    }

    /// Absolute expiry time in Unix milliseconds.
    pub fn expires_at(&self) -> u64 {
        self.created_at.saturating_add(self.ttl_ms)
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds (0 once expired).
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at().saturating_sub(now)
    }

    /// Milliseconds since creation.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Milliseconds since the last access.
    pub fn idle_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_accessed_at)
    }

    /// Records a successful read.
    pub(crate) fn record_access(&mut self, now: u64, touch: u64) {
        self.last_accessed_at = now;
        self.access_count = self.access_count.saturating_add(1);
        self.touch = touch;
    }

    /// True if the entry carries any of the given tags.
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        !self.tags.is_disjoint(tags)
    }
}

/// Clamps a priority into `[0, 1]`; NaN becomes 0.
pub fn clamp_priority(priority: f64) -> f64 {
    if priority.is_nan() {
        0.0
    } else {
        priority.clamp(0.0, 1.0)
    }
}

/// Default priority for an entry of `size_bytes`: small payloads are cheaper to keep.
pub fn heuristic_priority(size_bytes: usize) -> f64 {
    let size_kib = size_bytes as f64 / 1024.0;
    clamp_priority(1.0 / (1.0 + size_kib))
}

// == Set Options ==
/// Per-call options for `set`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SetOptions {
    /// TTL in milliseconds (cache-wide default if None)
    pub ttl_ms: Option<u64>,
    /// Tags for group invalidation
    pub tags: Vec<String>,
    /// Priority in `[0, 1]` (size heuristic if None)
    pub priority: Option<f64>,
    /// Force compression on/off (size threshold if None)
    pub compress: Option<bool>,
    /// Mirror to persistence
    pub persist: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            ttl_ms: None,
            tags: Vec::new(),
            priority: None,
            compress: None,
            persist: true,
        }
    }
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    pub fn memory_only(mut self) -> Self {
        self.persist = false;
        self
    }
}
