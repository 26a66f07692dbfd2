//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, tag invalidation,
//! policy-driven eviction and optional compression.

mod clock;
mod codec;
pub mod compression;
mod entry;
mod eviction;
mod stats;
mod store;
mod typed;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use codec::{Codec, JsonCodec};
pub use entry::{clamp_priority, heuristic_priority, CacheEntry, Payload, SetOptions};
pub use eviction::{EvictionPolicy, EvictionWeights};
pub use stats::CacheStats;
pub use store::CacheStore;
pub use typed::Cache;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
