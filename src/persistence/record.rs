//! Persisted record layout.
//!
//! One record per key. Field names follow the camelCase layout shared with
//! browser-side stores of the same data.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, Payload};
use crate::error::Result;

/// On-disk form of a [`CacheEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub compressed: bool,
    pub created_at: u64,
    pub last_accessed_at: u64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub size_bytes: usize,
    pub ttl_ms: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: f64,
}

impl PersistedRecord {
    /// Parses a record body.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Serializes the record body.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Rebuilds the cache entry. The stored size is recomputed from the payload.
    pub fn into_entry(self) -> CacheEntry {
        let payload = Payload {
            data: self.value,
            compressed: self.compressed,
        };
        let mut entry = CacheEntry::new(
            self.key,
            payload,
            self.ttl_ms,
            self.tags.into_iter().collect(),
            self.priority,
            self.created_at,
        );
        entry.last_accessed_at = self.last_accessed_at.max(self.created_at);
        entry.access_count = self.access_count;
        entry
    }
}

impl From<&CacheEntry> for PersistedRecord {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            key: entry.key.clone(),
            value: entry.payload.data.clone(),
            compressed: entry.payload.compressed,
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            access_count: entry.access_count,
            size_bytes: entry.size_bytes,
            ttl_ms: entry.ttl_ms,
            tags: entry.tags.iter().cloned().collect(),
            priority: entry.priority,
        }
    }
}
