//! Response DTOs for the cache HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::persistence::PersistenceStatus;

/// Response body for the GET operation (GET /entries/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET and MERGE operations
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /entries/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// The key that was deleted
    pub key: String,
    /// False when the key was already absent
    pub removed: bool,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, removed: bool) -> Self {
        Self {
            key: key.into(),
            removed,
        }
    }
}

/// Response body for tag invalidation (POST /invalidate)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub tags: Vec<String>,
    pub removed: usize,
}

/// Response body for clearing the cache (DELETE /entries)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn cleared() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

/// Response body for a manual sweep (POST /cleanup)
#[derive(Debug, Clone, Serialize)]
pub struct CleanupResponse {
    /// Entries removed by this sweep
    pub removed: usize,
    /// True if another sweep was already running
    pub skipped: bool,
}

impl CleanupResponse {
    pub fn from_sweep(result: Option<usize>) -> Self {
        Self {
            removed: result.unwrap_or(0),
            skipped: result.is_none(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Number of TTL removals
    pub expirations: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Current estimated size in bytes
    pub total_size_bytes: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Moving average `get` latency in microseconds
    pub avg_access_latency_us: f64,
    /// Active eviction policy
    pub eviction_policy: String,
    /// Persistence mirror state, absent when persistence is off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PersistenceStatus>,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(
        stats: &CacheStats,
        eviction_policy: &str,
        persistence: Option<PersistenceStatus>,
    ) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            total_size_bytes: stats.total_size_bytes,
            hit_rate: stats.hit_rate(),
            avg_access_latency_us: stats.avg_access_latency_us,
            eviction_policy: eviction_policy.to_string(),
            persistence,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_response_serialize() {
        let resp = GetResponse::new("test_key", json!({"close": 1}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["key"], "test_key");
        assert_eq!(json["value"]["close"], 1);
    }

    #[test]
    fn test_set_response_serialize() {
        let resp = SetResponse::new("my_key");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("my_key"));
        assert!(json.contains("successfully"));
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            evictions: 5,
            total_entries: 100,
            ..CacheStats::default()
        };
        let resp = StatsResponse::new(&stats, "lru", None);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);

        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("persistence").is_none());
        assert_eq!(json["eviction_policy"], "lru");
    }

    #[test]
    fn test_cleanup_response_from_sweep() {
        let resp = CleanupResponse::from_sweep(None);
        assert!(resp.skipped);
        assert_eq!(resp.removed, 0);

        let resp = CleanupResponse::from_sweep(Some(3));
        assert!(!resp.skipped);
        assert_eq!(resp.removed, 3);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
