//! Cache backend trait and statistics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Cache backend trait for pluggable cache implementations.
///
/// Keys are opaque strings and values are JSON documents. Implementations
/// must be safe for concurrent use through a shared `Arc<dyn CacheBackend>`.
///
/// # Failure Semantics
///
/// None of these methods return errors. A backend that cannot complete an
/// operation logs the cause and answers as if the key were absent (`get`),
/// nothing happened (`delete`, `sweep_expired`), or the write was lost
/// (`set` returns `false`). Callers must never fail a request because the
/// cache is unavailable.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a live value.
    ///
    /// An expired or unparsable entry is removed as a side effect and
    /// reported as absent.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value, replacing any previous one. `ttl = None` never expires.
    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool;

    /// Remove a key. Returns true only if something was removed.
    async fn delete(&self, key: &str) -> bool;

    /// Actively remove expired entries, returning how many were removed.
    async fn sweep_expired(&self) -> u64;

    /// Get cache statistics.
    async fn stats(&self) -> CacheStats;

    /// Release backend resources. Called once at process teardown.
    async fn shutdown(&self) {}

    /// Short backend name for logs and health output.
    fn backend_name(&self) -> &'static str;
}

/// Statistics about cache contents and usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Backend that produced these numbers.
    pub backend: String,
    /// Number of stored entries, live or not.
    pub total_entries: u64,
    /// Entries that would be returned by `get`.
    pub valid_entries: u64,
    /// Expired entries still on storage. Unreadable entries count here too.
    pub expired_entries: u64,
    /// Approximate storage or memory footprint in bytes.
    pub size_bytes: u64,
    /// Lookups answered from the cache since startup.
    pub hits: u64,
    /// Lookups that found nothing usable since startup.
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
