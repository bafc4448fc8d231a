//! Backend selection at startup.
//!
//! Called once while the process wires its components together. The result
//! is passed explicitly to everything that needs the cache; there is no
//! global instance.

use std::sync::Arc;

use lifetrace_core::{CacheBackendKind, CacheSettings, ConfigError, LifetraceResult};

use super::file_backend::FileCacheBackend;
use super::redis_backend::RedisCacheBackend;
use super::traits::CacheBackend;

/// Pick and initialize the cache backend.
///
/// Selection order:
/// 1. An explicit `backend_override` wins. An explicitly requested Redis
///    backend that cannot connect is a startup error.
/// 2. Otherwise a configured `redis_url` is tried, falling back to the disk
///    backend if the connection fails.
/// 3. Otherwise the disk backend.
///
/// Callers own the returned handle and must call
/// [`CacheBackend::shutdown`] once at teardown.
pub async fn resolve_cache_backend(
    settings: &CacheSettings,
) -> LifetraceResult<Arc<dyn CacheBackend>> {
    match settings.backend_override {
        Some(CacheBackendKind::File) => open_file(settings).await,
        Some(CacheBackendKind::Redis) => {
            let url = settings.redis_url.as_deref().ok_or_else(|| ConfigError::MissingRequired {
                field: "LIFETRACE_REDIS_URL".to_string(),
            })?;
            connect_redis(url, settings).await
        }
        None => match settings.redis_url.as_deref() {
            Some(url) => match connect_redis(url, settings).await {
                Ok(backend) => Ok(backend),
                Err(e) => {
                    tracing::warn!(error = %e, "Redis cache unavailable, falling back to file cache");
                    open_file(settings).await
                }
            },
            None => open_file(settings).await,
        },
    }
}

async fn open_file(settings: &CacheSettings) -> LifetraceResult<Arc<dyn CacheBackend>> {
    let backend = FileCacheBackend::open(settings.cache_dir.clone()).await?;
    Ok(Arc::new(backend))
}

async fn connect_redis(
    url: &str,
    settings: &CacheSettings,
) -> LifetraceResult<Arc<dyn CacheBackend>> {
    let backend = RedisCacheBackend::connect(
        url,
        settings.key_prefix.clone(),
        settings.redis_connect_timeout,
    )
    .await?;
    Ok(Arc::new(backend))
}
