//! Dash Cache - best-effort local cache for dashboard payloads
//!
//! Provides TTL expiration, tag invalidation, adaptive eviction and a
//! persistence mirror that survives restarts.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheStats, EvictionPolicy, JsonCodec, SetOptions};
pub use config::{CacheConfig, Config};
pub use tasks::{spawn_cleanup_task, Sweeper};
