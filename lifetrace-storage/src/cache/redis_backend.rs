//! Redis cache backend.
//!
//! Keys are stored under an application prefix so several services can share
//! one Redis database. Expiry is delegated to Redis via `SETEX`, which makes
//! `sweep_expired` a no-op here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use lifetrace_core::{CacheError, LifetraceResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use super::entry::StoredEntry;
use super::traits::{CacheBackend, CacheStats};

const BACKEND: &str = "redis";

/// Keys sampled with `MEMORY USAGE` when estimating footprint.
const MEMORY_SAMPLE_SIZE: usize = 100;

/// `COUNT` hint for each `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Redis-backed cache sharing one multiplexed connection.
pub struct RedisCacheBackend {
    connection: RwLock<Option<ConnectionManager>>,
    prefix: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for RedisCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheBackend")
            .field("prefix", &self.prefix)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RedisCacheBackend {
    /// Connect and verify the server answers `PING`.
    ///
    /// Fails with `CacheError::Unavailable` if the URL is invalid, the server
    /// cannot be reached within `connect_timeout`, or the ping fails.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        connect_timeout: Duration,
    ) -> LifetraceResult<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Unavailable {
                backend: BACKEND.to_string(),
                reason: format!("connect timed out after {}ms", connect_timeout.as_millis()),
            })?
            .map_err(unavailable)?;

        let backend = Self {
            connection: RwLock::new(Some(manager)),
            prefix: prefix.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        backend.ping().await?;
        tracing::info!(prefix = %backend.prefix, "Redis cache backend ready");
        Ok(backend)
    }

    /// Health probe.
    pub async fn ping(&self) -> LifetraceResult<()> {
        let mut conn = self.connection()?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        if reply != "PONG" {
            return Err(CacheError::Unavailable {
                backend: BACKEND.to_string(),
                reason: format!("unexpected PING reply: {reply}"),
            }
            .into());
        }
        Ok(())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Clone of the shared connection, or `Unavailable` after shutdown.
    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let guard = self.connection.read().map_err(|_| CacheError::Backend {
            backend: BACKEND.to_string(),
            reason: "connection lock poisoned".to_string(),
        })?;
        guard.as_ref().cloned().ok_or_else(|| CacheError::Unavailable {
            backend: BACKEND.to_string(),
            reason: "backend has been shut down".to_string(),
        })
    }

    async fn try_get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut conn = self.connection()?;
        let full_key = self.namespaced(key);
        let raw: Option<String> = conn.get(&full_key).await.map_err(backend_error)?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<StoredEntry>(&raw) {
            Ok(entry) if !entry.is_expired() => Ok(Some(entry.data)),
            Ok(_) => {
                let _: i64 = conn.del(&full_key).await.map_err(backend_error)?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Corrupt cache entry in redis, deleting");
                let _: i64 = conn.del(&full_key).await.map_err(backend_error)?;
                Ok(None)
            }
        }
    }

    async fn try_set(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let entry = StoredEntry::new(value.clone(), ttl);
        let payload = serde_json::to_string(&entry).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let full_key = self.namespaced(key);

        match ttl {
            Some(ttl) => {
                // SETEX needs whole seconds and rejects zero.
                let seconds = ttl.as_secs_f64().ceil().max(1.0) as u64;
                conn.set_ex::<_, _, ()>(&full_key, payload, seconds)
                    .await
                    .map_err(backend_error)
            }
            None => conn
                .set::<_, _, ()>(&full_key, payload)
                .await
                .map_err(backend_error),
        }
    }

    async fn try_delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;
        let removed: i64 = conn
            .del(self.namespaced(key))
            .await
            .map_err(backend_error)?;
        Ok(removed > 0)
    }

    /// All keys under this backend's prefix, via incremental `SCAN`.
    async fn scan_keys(&self, conn: &mut ConnectionManager) -> Result<Vec<String>, CacheError> {
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(conn)
                .await
                .map_err(backend_error)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn try_stats(&self) -> Result<CacheStats, CacheError> {
        let mut conn = self.connection()?;
        let keys = self.scan_keys(&mut conn).await?;
        let total = keys.len() as u64;

        let mut sampled_bytes = 0u64;
        let mut sampled = 0u64;
        for key in keys.iter().take(MEMORY_SAMPLE_SIZE) {
            let usage: Option<u64> = redis::cmd("MEMORY")
                .arg("USAGE")
                .arg(key)
                .query_async(&mut conn)
                .await
                .ok()
                .flatten();
            if let Some(bytes) = usage {
                sampled_bytes += bytes;
                sampled += 1;
            }
        }
        let size_bytes = if sampled == 0 {
            0
        } else {
            sampled_bytes * total / sampled
        };

        Ok(CacheStats {
            backend: BACKEND.to_string(),
            total_entries: total,
            // Redis evicts expired keys itself.
            valid_entries: total,
            expired_entries: 0,
            size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        })
    }
}

fn unavailable(e: redis::RedisError) -> CacheError {
    CacheError::Unavailable {
        backend: BACKEND.to_string(),
        reason: e.to_string(),
    }
}

fn backend_error(e: redis::RedisError) -> CacheError {
    CacheError::Backend {
        backend: BACKEND.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Option<Value> {
        let result = self.try_get(key).await.unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
            None
        });
        let counter = if result.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        result
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        match self.try_set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache write failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.try_delete(key).await.unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Cache delete failed");
            false
        })
    }

    async fn sweep_expired(&self) -> u64 {
        tracing::debug!("Redis expires keys itself, nothing to sweep");
        0
    }

    async fn stats(&self) -> CacheStats {
        self.try_stats().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to collect cache stats");
            CacheStats {
                backend: BACKEND.to_string(),
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
                ..CacheStats::default()
            }
        })
    }

    async fn shutdown(&self) {
        match self.connection.write() {
            Ok(mut guard) => {
                if guard.take().is_some() {
                    tracing::info!("Redis cache connection released");
                }
            }
            Err(_) => tracing::warn!("Redis connection lock poisoned during shutdown"),
        }
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}
