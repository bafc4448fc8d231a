//! Result cache for extracted biographies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   RequestCoalescer   │  per-key lock + double-checked lookup
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │ Arc<dyn CacheBackend>│  chosen once by resolve_cache_backend()
//! └──────────┬───────────┘
//!      ┌─────┴──────┐
//! ┌────▼─────┐ ┌────▼──────┐
//! │   File   │ │   Redis   │
//! └──────────┘ └───────────┘
//! ```
//!
//! Backends never fail a caller. I/O, serialization, and connectivity
//! problems are logged and reported as a miss, a `false` flag, or zero.

mod coalesce;
mod entry;
mod file_backend;
mod redis_backend;
mod selector;
mod traits;

pub use coalesce::{Coalesced, CoalescerStats, RequestCoalescer};
pub use entry::StoredEntry;
pub use file_backend::FileCacheBackend;
pub use redis_backend::RedisCacheBackend;
pub use selector::resolve_cache_backend;
pub use traits::{CacheBackend, CacheStats};
