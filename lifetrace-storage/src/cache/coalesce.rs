//! Per-key request coalescing.
//!
//! Concurrent callers asking for the same key share one upstream
//! computation. Callers for different keys never wait on each other.
//!
//! ```text
//! get_or_compute(key)
//!   ├─ cache hit ───────────────────────────────► return
//!   ├─ lock(key)            (waits behind any in-flight computation)
//!   ├─ cache hit (filled while waiting) ────────► return
//!   └─ spawn { compute → cache.set } ──── join ─► return
//! ```
//!
//! The computation runs on its own task and owns the key's lock guard, so a
//! caller that stops waiting does not abandon it: the result still lands in
//! the cache for the next caller.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lifetrace_core::{LifetraceError, LifetraceResult};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::traits::CacheBackend;

/// A value returned by the coalescer, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Coalesced<T> {
    pub value: T,
    /// True when served from the cache rather than computed by this call.
    pub from_cache: bool,
}

/// Counters describing coalescer activity since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CoalescerStats {
    pub cache_hits: u64,
    /// Hits found only after waiting on another caller's computation.
    pub coalesced_hits: u64,
    pub computations: u64,
    pub tracked_keys: usize,
}

/// Collapses concurrent identical computations into one.
pub struct RequestCoalescer {
    cache: Arc<dyn CacheBackend>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    lock_timeout: Option<Duration>,
    max_tracked_keys: usize,
    cache_hits: AtomicU64,
    coalesced_hits: AtomicU64,
    computations: AtomicU64,
}

impl std::fmt::Debug for RequestCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("backend", &self.cache.backend_name())
            .field("tracked_keys", &self.locks.len())
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

impl RequestCoalescer {
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            cache,
            locks: DashMap::new(),
            lock_timeout: None,
            max_tracked_keys: 10_000,
            cache_hits: AtomicU64::new(0),
            coalesced_hits: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// Bound how long a caller waits behind another caller's computation.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Lock-map size above which idle entries are pruned.
    pub fn with_max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = max;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced_hits: self.coalesced_hits.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            tracked_keys: self.locks.len(),
        }
    }

    /// Return the cached value for `key`, or compute, cache, and return it.
    ///
    /// At most one `compute` for a given key runs at a time in this process.
    /// A failed computation is not cached; its error goes to the caller that
    /// ran it, and the next caller retries.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> LifetraceResult<Coalesced<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LifetraceResult<T>> + Send + 'static,
    {
        if let Some(value) = self.lookup::<T>(key).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Coalesced {
                value,
                from_cache: true,
            });
        }

        let guard = self.acquire(key).await?;

        if let Some(value) = self.lookup::<T>(key).await {
            tracing::debug!(key, "Served by a concurrent computation");
            self.coalesced_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Coalesced {
                value,
                from_cache: true,
            });
        }

        self.computations.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::clone(&self.cache);
        let owned_key = key.to_string();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let value = compute().await?;
            match serde_json::to_value(&value) {
                Ok(json) => {
                    if !cache.set(&owned_key, &json, ttl).await {
                        tracing::warn!(key = %owned_key, "Computed value was not cached");
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %owned_key, error = %e, "Computed value is not serializable");
                }
            }
            Ok::<T, LifetraceError>(value)
        });

        let value = task.await.map_err(|e| LifetraceError::TaskFailed {
            reason: e.to_string(),
        })??;
        Ok(Coalesced {
            value,
            from_cache: false,
        })
    }

    /// Drop lock handles no caller holds. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        // The map's own reference is the only one when nobody waits or computes.
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Get-or-create the key's lock and wait for it.
    async fn acquire(&self, key: &str) -> LifetraceResult<OwnedMutexGuard<()>> {
        if self.locks.len() > self.max_tracked_keys {
            let pruned = self.prune_idle();
            tracing::debug!(pruned, "Pruned idle coalescing locks");
        }

        let lock = Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        match self.lock_timeout {
            None => Ok(lock.lock_owned().await),
            Some(limit) => tokio::time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| {
                    tracing::warn!(key, waited_ms = limit.as_millis() as u64, "Coalescing wait timed out");
                    LifetraceError::CoalescingTimeout {
                        key: key.to_string(),
                        waited_ms: limit.as_millis() as u64,
                    }
                }),
        }
    }

    /// Typed cache read. A value that no longer decodes as `T` is discarded.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.cache.get(key).await?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached value has unexpected shape, discarding");
                self.cache.delete(key).await;
                None
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FileCacheBackend;
    use lifetrace_core::ExtractionError;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    async fn create_test_coalescer() -> (Arc<RequestCoalescer>, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = FileCacheBackend::open(temp_dir.path())
            .await
            .expect("backend creation should succeed");
        (Arc::new(RequestCoalescer::new(Arc::new(backend))), temp_dir)
    }

    fn slow_compute(
        counter: Arc<AtomicUsize>,
        delay: Duration,
        value: &str,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = LifetraceResult<String>> + Send>>
           + Send
           + 'static {
        let value = value.to_string();
        move || -> std::pin::Pin<Box<dyn Future<Output = LifetraceResult<String>> + Send>> {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(value)
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_computation() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coalescer = Arc::clone(&coalescer);
            let compute = slow_compute(Arc::clone(&counter), Duration::from_millis(100), "result");
            handles.push(tokio::spawn(async move {
                coalescer.get_or_compute("same-key", None, compute).await
            }));
        }

        let mut computed = 0;
        for handle in handles {
            let outcome = handle
                .await
                .expect("task should not panic")
                .expect("computation should succeed");
            assert_eq!(outcome.value, "result");
            if !outcome.from_cache {
                computed += 1;
            }
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(computed, 1);
        assert_eq!(coalescer.stats().computations, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_keys_do_not_block_each_other() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        let counter = Arc::new(AtomicUsize::new(0));

        let started = std::time::Instant::now();
        let a = {
            let coalescer = Arc::clone(&coalescer);
            let compute = slow_compute(Arc::clone(&counter), Duration::from_millis(200), "a");
            tokio::spawn(async move { coalescer.get_or_compute("key-a", None, compute).await })
        };
        let b = {
            let coalescer = Arc::clone(&coalescer);
            let compute = slow_compute(Arc::clone(&counter), Duration::from_millis(200), "b");
            tokio::spawn(async move { coalescer.get_or_compute("key-b", None, compute).await })
        };
        a.await.expect("task should not panic").expect("a should succeed");
        b.await.expect("task should not panic").expect("b should succeed");

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        let counter = Arc::new(AtomicUsize::new(0));

        let first = coalescer
            .get_or_compute("k", None, slow_compute(Arc::clone(&counter), Duration::ZERO, "v"))
            .await
            .expect("first call should succeed");
        let second = coalescer
            .get_or_compute("k", None, slow_compute(Arc::clone(&counter), Duration::ZERO, "other"))
            .await
            .expect("second call should succeed");

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(second.value, "v");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached_and_next_call_retries() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        let attempts = Arc::new(AtomicUsize::new(0));

        let failing = {
            let attempts = Arc::clone(&attempts);
            move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(LifetraceError::from(ExtractionError::EmptyInput))
            }
        };
        let result = coalescer.get_or_compute("k", None, failing).await;
        assert!(matches!(
            result,
            Err(LifetraceError::Extraction(ExtractionError::EmptyInput))
        ));
        assert_eq!(coalescer.cache().get("k").await, None);

        let retried = coalescer
            .get_or_compute("k", None, slow_compute(Arc::clone(&attempts), Duration::ZERO, "ok"))
            .await
            .expect("retry should succeed");
        assert_eq!(retried.value, "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_wait_times_out() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = FileCacheBackend::open(temp_dir.path())
            .await
            .expect("backend creation should succeed");
        let coalescer = Arc::new(
            RequestCoalescer::new(Arc::new(backend))
                .with_lock_timeout(Some(Duration::from_millis(50))),
        );
        let counter = Arc::new(AtomicUsize::new(0));

        let holder = {
            let coalescer = Arc::clone(&coalescer);
            let compute = slow_compute(Arc::clone(&counter), Duration::from_millis(400), "slow");
            tokio::spawn(async move { coalescer.get_or_compute("k", None, compute).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let waiter = coalescer
            .get_or_compute("k", None, slow_compute(Arc::clone(&counter), Duration::ZERO, "x"))
            .await;
        assert!(matches!(
            waiter,
            Err(LifetraceError::CoalescingTimeout { ref key, .. }) if key == "k"
        ));

        let held = holder
            .await
            .expect("task should not panic")
            .expect("holder should succeed");
        assert_eq!(held.value, "slow");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_caller_still_fills_cache() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        let counter = Arc::new(AtomicUsize::new(0));

        let gave_up = tokio::time::timeout(
            Duration::from_millis(50),
            coalescer.get_or_compute(
                "k",
                None,
                slow_compute(Arc::clone(&counter), Duration::from_millis(200), "late"),
            ),
        )
        .await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(
            coalescer.cache().get("k").await,
            Some(serde_json::json!("late"))
        );
    }

    #[tokio::test]
    async fn test_undecodable_cached_value_is_recomputed() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        assert!(
            coalescer
                .cache()
                .set("k", &serde_json::json!({"not": "a string"}), None)
                .await
        );

        let counter = Arc::new(AtomicUsize::new(0));
        let outcome = coalescer
            .get_or_compute("k", None, slow_compute(Arc::clone(&counter), Duration::ZERO, "fresh"))
            .await
            .expect("recompute should succeed");
        assert_eq!(outcome.value, "fresh");
        assert!(!outcome.from_cache);
    }

    #[tokio::test]
    async fn test_prune_idle_drops_unheld_locks() {
        let (coalescer, _temp_dir) = create_test_coalescer().await;
        let counter = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b", "c"] {
            coalescer
                .get_or_compute(key, None, slow_compute(Arc::clone(&counter), Duration::ZERO, key))
                .await
                .expect("compute should succeed");
        }
        assert_eq!(coalescer.stats().tracked_keys, 3);
        assert_eq!(coalescer.prune_idle(), 3);
        assert_eq!(coalescer.stats().tracked_keys, 0);
    }
}
