//! Typed cache facade.
//!
//! Wraps a [`CacheStore`] with a [`Codec`] so callers work with their own
//! value type. Every operation is fail-soft: encoding, compression and
//! decoding problems are logged and degrade to a no-op or a miss.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::cache::compression::{pack, unpack};
use crate::cache::{CacheStats, CacheStore, Clock, Codec, JsonCodec, SetOptions, SystemClock};
use crate::config::CacheConfig;
use crate::persistence::{PersistenceAdapter, PersistenceHandle, PersistenceStatus};

// == Cache ==
/// In-process cache of `T` values.
#[derive(Debug)]
pub struct Cache<T, C = JsonCodec> {
    store: CacheStore,
    codec: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C: Codec<T>> Cache<T, C> {
    // == Constructors ==
    /// Creates a memory-only cache on the system clock.
    pub fn new(config: CacheConfig, codec: C) -> Self {
        Self::with_clock(config, codec, Arc::new(SystemClock))
    }

    /// Creates a memory-only cache on the given clock.
    pub fn with_clock(config: CacheConfig, codec: C, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: CacheStore::with_clock(config, clock),
            codec,
            _marker: PhantomData,
        }
    }

    /// Creates a cache mirrored to `adapter`, rehydrated from what it holds.
    ///
    /// Must run inside a tokio runtime; the persistence writer is spawned on it.
    pub async fn open(
        config: CacheConfig,
        codec: C,
        clock: Arc<dyn Clock>,
        adapter: PersistenceAdapter,
        queue_capacity: usize,
    ) -> Self {
        let mut cache = Self::with_clock(config, codec, clock);
        let now = cache.store.now();

        let loader = adapter.clone();
        let loaded = match tokio::task::spawn_blocking(move || loader.load(now)).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Persistence load task failed, starting cold: {}", e);
                Default::default()
            }
        };

        let (handle, _writer) = adapter.spawn_writer(queue_capacity);
        cache.store.attach_persistence(handle);
        let restored = cache.store.restore(loaded.into_values());
        info!(
            "Rehydrated {} entries from '{}' persistence",
            restored,
            adapter.backend_name()
        );
        cache
    }

    // == Get ==
    /// Returns the value for `key`, or None if absent, expired or undecodable.
    pub fn get(&mut self, key: &str) -> Option<T> {
        let payload = self.store.get(key)?;
        let decoded = unpack(&payload).and_then(|encoded| self.codec.decode(&encoded));
        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Dropping undecodable entry for key '{}': {}", key, e);
                self.store.discard_corrupt(key);
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`. A value that cannot be encoded leaves the
    /// cache unchanged.
    pub fn set(&mut self, key: impl Into<String>, value: &T, options: SetOptions) {
        let key = key.into();
        let encoded = match self.codec.encode(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Skipping set for key '{}': {}", key, e);
                return;
            }
        };

        let payload = pack(
            encoded,
            options.compress,
            self.store.config().compression_threshold,
        );
        self.store.set(key, payload, &options);
    }

    // == Delete ==
    /// Removes `key`. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.store.delete(key)
    }

    /// Removes every entry tagged with any of `tags`.
    pub fn delete_by_tags<I, S>(&mut self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.delete_by_tags(tags)
    }

    /// Removes every entry and resets statistics.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Removes expired entries. Returns the number removed.
    pub fn cleanup_expired(&mut self) -> usize {
        self.store.cleanup_expired()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn reset_stats(&mut self) {
        self.store.reset_stats();
    }

    /// Persistence mirror state, if persistence is enabled.
    pub fn persistence_status(&self) -> Option<PersistenceStatus> {
        self.store.persistence().map(PersistenceHandle::status)
    }

    /// Handle to the persistence queue, for flushing outside a lock.
    pub fn persistence(&self) -> Option<PersistenceHandle> {
        self.store.persistence().cloned()
    }

    /// Waits for queued persistence writes to land.
    pub async fn flush(&self) {
        if let Some(handle) = self.persistence() {
            handle.flush().await;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Underlying payload store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    fn peek_value(&self, key: &str) -> Option<T> {
        let entry = self.store.peek(key)?;
        unpack(&entry.payload)
            .and_then(|encoded| self.codec.decode(&encoded))
            .ok()
    }
}

impl<C: Codec<Value>> Cache<Value, C> {
    // == Merge ==
    /// Shallow-merges an object `patch` into the object stored at `key`.
    ///
    /// Falls back to a plain `set` when either side is not an object or the
    /// key is absent. Does not count as a read.
    pub fn merge(&mut self, key: &str, patch: Value, options: SetOptions) -> Value {
        let merged = match (self.peek_value(key), patch) {
            (Some(Value::Object(mut current)), Value::Object(patch)) => {
                current.extend(patch);
                Value::Object(current)
            }
            (_, patch) => patch,
        };
        self.set(key, &merged, options);
        merged
    }
}
