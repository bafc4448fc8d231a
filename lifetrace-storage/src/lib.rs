//! LifeTrace Storage - Result Cache and Request Coalescing
//!
//! Pluggable TTL cache backends (one JSON file per key on disk, or a Redis
//! store), the selector that picks one at startup, and the per-key
//! coalescer that collapses concurrent identical computations.

pub mod cache;

pub use cache::{
    resolve_cache_backend, CacheBackend, CacheStats, FileCacheBackend, RedisCacheBackend,
    Coalesced, CoalescerStats, RequestCoalescer, StoredEntry,
};
