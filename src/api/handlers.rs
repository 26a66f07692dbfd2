//! API Handlers
//!
//! HTTP request handlers for each cache endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::cache::{Cache, JsonCodec, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::requests::validate_key;
use crate::models::{
    CleanupResponse, ClearResponse, DeleteResponse, GetResponse, HealthResponse,
    InvalidateRequest, InvalidateResponse, MergeRequest, SetRequest, SetResponse, StatsResponse,
};
use crate::persistence::PersistenceAdapter;
use crate::tasks::Sweeper;

/// Application state shared across all handlers.
///
/// Contains the cache wrapped in Arc<RwLock<>> for thread-safe access.
#[derive(Clone)]
pub struct AppState {
    /// Thread-safe cache
    pub cache: Arc<RwLock<Cache<Value>>>,
    /// Shared with the background cleanup task
    pub sweeper: Sweeper,
}

impl AppState {
    /// Creates a new AppState with the given cache.
    pub fn new(cache: Cache<Value>) -> Self {
        Self {
            cache: Arc::new(RwLock::new(cache)),
            sweeper: Sweeper::new(),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the configured persistence backend and rehydrates from it.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let cache_config = config.cache_config();
        let adapter = PersistenceAdapter::from_kind(config.persistence, &config.persistence_path)?;

        let cache = match adapter {
            Some(adapter) => {
                Cache::open(
                    cache_config,
                    JsonCodec,
                    Arc::new(SystemClock),
                    adapter,
                    config.persist_queue_capacity,
                )
                .await
            }
            None => Cache::new(cache_config, JsonCodec),
        };
        Ok(Self::new(cache))
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

/// Handler for PUT /entries
///
/// Stores a JSON value with optional TTL, tags, priority and flags.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let mut cache = state.cache.write().await;
    cache.set(req.key.clone(), &req.value, req.options);

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /entries/:key
///
/// Retrieves a value from the cache by key.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    // Write lock: reads update access metadata and stats
    let mut cache = state.cache.write().await;
    match cache.get(&key) {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for PATCH /entries/:key
///
/// Shallow-merges an object into the stored object.
pub async fn merge_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<MergeRequest>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;

    let mut cache = state.cache.write().await;
    let merged = cache.merge(&key, req.value, req.options);

    Ok(Json(GetResponse::new(key, merged)))
}

/// Handler for DELETE /entries/:key
///
/// Deletes a key. Deleting a missing key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<DeleteResponse> {
    let removed = state.cache.write().await.delete(&key);
    Json(DeleteResponse::new(key, removed))
}

/// Handler for DELETE /entries
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.write().await.clear();
    Json(ClearResponse::cleared())
}

/// Handler for POST /invalidate
///
/// Removes every entry carrying any of the given tags.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state.cache.write().await.delete_by_tags(req.tags.iter().cloned());
    Ok(Json(InvalidateResponse {
        tags: req.tags,
        removed,
    }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.cache.read().await;
    let stats = cache.stats();
    let policy = cache.store().config().eviction_policy.name();

    Json(StatsResponse::new(&stats, policy, cache.persistence_status()))
}

/// Handler for POST /stats/reset
pub async fn reset_stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let mut cache = state.cache.write().await;
    cache.reset_stats();
    let policy = cache.store().config().eviction_policy.name();

    Json(StatsResponse::new(&cache.stats(), policy, cache.persistence_status()))
}

/// Handler for POST /cleanup
///
/// Runs a TTL sweep now, unless one is already running.
pub async fn cleanup_handler(State(state): State<AppState>) -> Json<CleanupResponse> {
    let result = state.sweeper.sweep(&state.cache).await;
    Json(CleanupResponse::from_sweep(result))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SetOptions;
    use crate::config::CacheConfig;
    use serde_json::json;

    fn state() -> AppState {
        AppState::new(Cache::new(CacheConfig::default(), JsonCodec))
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = state();

        let req = SetRequest {
            key: "test_key".to_string(),
            value: json!({"close": 2850}),
            options: SetOptions::default(),
        };
        let result = set_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let result = get_handler(State(state.clone()), Path("test_key".to_string())).await;
        let response = result.unwrap();
        assert_eq!(response.value, json!({"close": 2850}));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let result = get_handler(State(state()), Path("nonexistent".to_string())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_handler_is_idempotent() {
        let state = state();
        state
            .cache
            .write()
            .await
            .set("to_delete", &json!(1), SetOptions::default());

        let first = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(first.removed);

        let second = delete_handler(State(state.clone()), Path("to_delete".to_string())).await;
        assert!(!second.removed);
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let state = state();
        {
            let mut cache = state.cache.write().await;
            cache.set("b", &json!(1), SetOptions::new().with_tag("group1"));
            cache.set("c", &json!(2), SetOptions::new().with_tag("group2"));
        }

        let req = InvalidateRequest {
            tags: vec!["group2".to_string()],
        };
        let response = invalidate_handler(State(state.clone()), Json(req)).await.unwrap();
        assert_eq!(response.removed, 1);
        assert!(state.cache.read().await.contains("b"));
    }

    #[tokio::test]
    async fn test_merge_handler_rejects_long_key() {
        let req = MergeRequest {
            value: json!({}),
            options: SetOptions::default(),
        };
        let result = merge_handler(State(state()), Path("k".repeat(300)), Json(req)).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let response = stats_handler(State(state())).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.eviction_policy, "adaptive");
        assert!(response.persistence.is_none());
    }

    #[tokio::test]
    async fn test_from_config_with_memory_persistence() {
        let config = Config {
            persistence: crate::persistence::PersistenceKind::Memory,
            ..Config::default()
        };
        let state = AppState::from_config(&config).await.unwrap();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.0.persistence.unwrap().backend, "memory");
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let req = SetRequest {
            key: "".to_string(),
            value: json!("value"),
            options: SetOptions::default(),
        };
        let result = set_handler(State(state()), Json(req)).await;
        assert!(result.is_err());
    }
}
