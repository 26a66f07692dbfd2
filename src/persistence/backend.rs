//! Persistence backends.
//!
//! A backend stores opaque record bodies keyed by cache key. Backends are
//! blocking; the writer task calls them on the blocking pool.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{CacheError, Result};

// == Backend Trait ==
/// Durable key-value store for record bodies.
pub trait PersistenceBackend: Send + Sync + 'static {
    /// Short name for logs and stats.
    fn name(&self) -> &'static str;

    /// Returns every stored body. Unreadable individual records are skipped.
    fn load_all(&self) -> Result<Vec<String>>;

    /// Writes or overwrites the body for `key`.
    fn save(&self, key: &str, body: &str) -> Result<()>;

    /// Removes `key`. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<()>;

    /// Removes every record.
    fn clear(&self) -> Result<()>;
}

// == Memory Backend ==
/// Volatile backend. Survives cache instances within one process, which is
/// enough to exercise reloads; can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail, as storage that is full or disabled would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Inserts a raw body, bypassing the cache.
    pub fn insert_raw(&self, key: &str, body: &str) -> Result<()> {
        self.records()?.insert(key.to_string(), body.to_string());
        Ok(())
    }

    /// Stored body for `key`, if any.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.records().ok()?.get(key).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Persistence(
                "memory backend unavailable".to_string(),
            ));
        }
        self.records
            .lock()
            .map_err(|_| CacheError::Persistence("memory backend lock poisoned".to_string()))
    }
}

impl PersistenceBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_all(&self) -> Result<Vec<String>> {
        Ok(self.records()?.values().cloned().collect())
    }

    fn save(&self, key: &str, body: &str) -> Result<()> {
        self.insert_raw(key, body)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.records()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.records()?.clear();
        Ok(())
    }
}
