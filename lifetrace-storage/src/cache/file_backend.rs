//! Disk cache backend: one JSON file per key.
//!
//! Files are named by the SHA-256 of the key, so arbitrary keys can never
//! escape the cache directory or exceed filename limits. Each file holds a
//! pretty-printed [`StoredEntry`].
//!
//! Writes go to a uniquely named temporary file that is then renamed over
//! the target. Rename is atomic on the same filesystem, so a concurrent
//! reader sees either the old entry or the new one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use lifetrace_core::{CacheError, LifetraceResult};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::entry::StoredEntry;
use super::traits::{CacheBackend, CacheStats};

const ENTRY_EXTENSION: &str = "json";

/// Outcome of reading one entry file.
enum Loaded {
    Missing,
    Corrupt(String),
    Entry(StoredEntry),
}

/// File-per-key cache rooted at a directory.
#[derive(Debug)]
pub struct FileCacheBackend {
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileCacheBackend {
    /// Open (creating if needed) a cache directory.
    pub async fn open(dir: impl Into<PathBuf>) -> LifetraceResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, &e))?;
        tracing::info!(dir = %dir.display(), "File cache backend ready");
        Ok(Self {
            dir,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file that stores `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    async fn load(path: &Path) -> Result<Loaded, CacheError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Loaded::Missing),
            Err(e) => return Err(io_error(path, &e)),
        };
        match serde_json::from_slice::<StoredEntry>(&bytes) {
            Ok(entry) => Ok(Loaded::Entry(entry)),
            Err(e) => Ok(Loaded::Corrupt(e.to_string())),
        }
    }

    async fn remove(path: &Path) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(path, &e)),
        }
    }

    /// Remove a file whose contents are unusable, logging instead of failing.
    async fn evict(path: &Path, reason: &str) {
        tracing::debug!(path = %path.display(), reason, "Evicting cache file");
        if let Err(e) = Self::remove(path).await {
            tracing::warn!(error = %e, "Failed to evict cache file");
        }
    }

    async fn write_entry(&self, key: &str, entry: &StoredEntry) -> Result<(), CacheError> {
        let payload = serde_json::to_vec_pretty(entry).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let target = self.path_for(key);
        let staging = target.with_extension(format!("{}.tmp", Uuid::now_v7().simple()));

        if let Err(e) = tokio::fs::write(&staging, &payload).await {
            return Err(io_error(&staging, &e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_error(&target, &e));
        }
        Ok(())
    }

    /// Paths of all entry files currently in the directory.
    async fn entry_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut reader = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, &e))?;
        let mut paths = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir, &e))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    async fn try_sweep(&self) -> Result<u64, CacheError> {
        let now = Utc::now();
        let mut removed = 0;
        for path in self.entry_paths().await? {
            let stale = match Self::load(&path).await? {
                Loaded::Entry(entry) => entry.is_expired_at(now),
                Loaded::Corrupt(_) => true,
                Loaded::Missing => false,
            };
            if stale && Self::remove(&path).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn try_stats(&self) -> Result<CacheStats, CacheError> {
        let now = Utc::now();
        let mut stats = CacheStats {
            backend: self.backend_name().to_string(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for path in self.entry_paths().await? {
            let size = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(&path, &e)),
            };
            match Self::load(&path).await? {
                Loaded::Missing => continue,
                Loaded::Entry(entry) if !entry.is_expired_at(now) => stats.valid_entries += 1,
                Loaded::Entry(_) | Loaded::Corrupt(_) => stats.expired_entries += 1,
            }
            stats.total_entries += 1;
            stats.size_bytes += size;
        }
        Ok(stats)
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    async fn get(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key);
        match Self::load(&path).await {
            Ok(Loaded::Entry(entry)) if entry.is_expired() => {
                Self::evict(&path, "expired").await;
                self.record_miss();
                None
            }
            Ok(Loaded::Entry(entry)) => {
                self.record_hit();
                Some(entry.data)
            }
            Ok(Loaded::Corrupt(reason)) => {
                tracing::warn!(key, reason = %reason, "Corrupt cache entry");
                Self::evict(&path, "corrupt").await;
                self.record_miss();
                None
            }
            Ok(Loaded::Missing) => {
                self.record_miss();
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                self.record_miss();
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        let entry = StoredEntry::new(value.clone(), ttl);
        match self.write_entry(key, &entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache write failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match Self::remove(&self.path_for(key)).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    async fn sweep_expired(&self) -> u64 {
        match self.try_sweep().await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "Swept expired cache files");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cache sweep failed");
                0
            }
        }
    }

    async fn stats(&self) -> CacheStats {
        match self.try_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to collect cache stats");
                CacheStats {
                    backend: self.backend_name().to_string(),
                    hits: self.hits.load(Ordering::Relaxed),
                    misses: self.misses.load(Ordering::Relaxed),
                    ..CacheStats::default()
                }
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

// ============================================================================
// TESTS
// ============================================================================
