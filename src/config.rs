//! Configuration Module
//!
//! Handles loading and managing configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::cache::EvictionPolicy;
use crate::persistence::PersistenceKind;

// == Cache Config ==
/// Settings for one cache instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Maximum total payload size in bytes (soft cap)
    pub max_size_bytes: usize,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Victim ordering under capacity pressure
    pub eviction_policy: EvictionPolicy,
    /// Payloads at or above this many bytes are compressed
    pub compression_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_size_bytes: 5 * 1024 * 1024,
            default_ttl_ms: 300_000,
            eviction_policy: EvictionPolicy::default(),
            compression_threshold: 1024,
        }
    }
}

// == Config ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Maximum total payload size in bytes
    pub max_size_bytes: usize,
    /// Default TTL in milliseconds
    pub default_ttl_ms: u64,
    /// Eviction policy
    pub eviction_policy: EvictionPolicy,
    /// Compression threshold in bytes
    pub compression_threshold: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Persistence backend
    pub persistence: PersistenceKind,
    /// Directory (file backend) or database file (sqlite backend)
    pub persistence_path: PathBuf,
    /// Bounded persistence queue size
    pub persist_queue_capacity: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `MAX_SIZE_BYTES` - Maximum total size (default: 5 MiB)
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `EVICTION_POLICY` - lru, lfu, fifo or adaptive (default: adaptive)
    /// - `COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `PERSISTENCE` - none, memory, file or sqlite (default: none)
    /// - `PERSISTENCE_PATH` - Storage location (default: ./dash_cache_data)
    /// - `PERSIST_QUEUE_CAPACITY` - Persistence queue size (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            max_size_bytes: env_or("MAX_SIZE_BYTES", defaults.max_size_bytes),
            default_ttl_ms: env_or("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            eviction_policy: env_or("EVICTION_POLICY", defaults.eviction_policy),
            compression_threshold: env_or(
                "COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            persistence: env_or("PERSISTENCE", defaults.persistence),
            persistence_path: env::var("PERSISTENCE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.persistence_path),
            persist_queue_capacity: env_or(
                "PERSIST_QUEUE_CAPACITY",
                defaults.persist_queue_capacity,
            ),
        }
    }

    /// Settings for the cache instance this configuration describes.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: self.max_entries,
            max_size_bytes: self.max_size_bytes,
            default_ttl_ms: self.default_ttl_ms,
            eviction_policy: self.eviction_policy,
            compression_threshold: self.compression_threshold,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            max_entries: cache.max_entries,
            max_size_bytes: cache.max_size_bytes,
            default_ttl_ms: cache.default_ttl_ms,
            eviction_policy: cache.eviction_policy,
            compression_threshold: cache.compression_threshold,
            server_port: 3000,
            cleanup_interval: 60,
            persistence: PersistenceKind::None,
            persistence_path: PathBuf::from("./dash_cache_data"),
            persist_queue_capacity: 1024,
        }
    }
}

/// Parses an environment variable, keeping `default` when unset or invalid.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Ignoring invalid {}={:?}: {}", name, raw, e);
            default
        }),
        Err(_) => default,
    }
}
