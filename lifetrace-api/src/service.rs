//! Biography lookup service.
//!
//! `get_biography` is the one operation the HTTP layer calls. It serves the
//! cached trajectory when one exists, and otherwise fetches the article and
//! runs the extraction pipeline under the coalescer, so concurrent requests
//! for the same subject share a single fetch and a single pipeline run.
//! Missing coordinates are filled in before the result is cached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lifetrace_core::{
    ArticleSource, BiographyRequest, BiographyResult, CacheSettings, ExtractionStrategy,
    LifetraceResult,
};
use lifetrace_pipeline::ExtractionPipeline;
use lifetrace_storage::{CacheBackend, Coalesced, CoalescerStats, RequestCoalescer};

use crate::telemetry::METRICS;

pub struct BiographyService {
    source: Arc<dyn ArticleSource>,
    pipeline: Arc<ExtractionPipeline>,
    coalescer: RequestCoalescer,
    entry_ttl: Option<Duration>,
    /// Coalesced hits already exported to the metrics counter.
    exported_coalesced: AtomicU64,
}

impl std::fmt::Debug for BiographyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiographyService")
            .field("source", &self.source.source_name())
            .field("coalescer", &self.coalescer)
            .field("entry_ttl", &self.entry_ttl)
            .finish()
    }
}

impl BiographyService {
    pub fn new(
        source: Arc<dyn ArticleSource>,
        pipeline: ExtractionPipeline,
        cache: Arc<dyn CacheBackend>,
        settings: &CacheSettings,
    ) -> Self {
        let coalescer = RequestCoalescer::new(cache)
            .with_lock_timeout(settings.coalesce_timeout)
            .with_max_tracked_keys(settings.max_tracked_keys);
        Self {
            source,
            pipeline: Arc::new(pipeline),
            coalescer,
            entry_ttl: settings.entry_ttl,
            exported_coalesced: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        self.coalescer.cache()
    }

    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.coalescer.stats()
    }

    pub fn default_strategy(&self) -> ExtractionStrategy {
        self.pipeline.default_strategy()
    }

    /// Trajectory for `request`, computed at most once per key at a time.
    ///
    /// `strategy` overrides the configured default. It does not take part in
    /// the cache key: a cached trajectory is served whichever strategy
    /// produced it.
    pub async fn get_biography(
        &self,
        request: &BiographyRequest,
        strategy: Option<ExtractionStrategy>,
    ) -> LifetraceResult<Coalesced<BiographyResult>> {
        let strategy = strategy.unwrap_or_else(|| self.pipeline.default_strategy());
        let key = request.cache_key();

        let source = Arc::clone(&self.source);
        let pipeline = Arc::clone(&self.pipeline);
        let subject = request.subject_name().to_string();
        let language = request.language().to_string();

        let outcome = self
            .coalescer
            .get_or_compute(&key, self.entry_ttl, move || async move {
                let text = source.fetch_article_text(&subject, &language).await?;
                let result = pipeline.extract(&text, strategy).await?;
                Ok(pipeline.locate(result).await)
            })
            .await;

        match &outcome {
            Ok(coalesced) => {
                tracing::debug!(
                    key = %key,
                    from_cache = coalesced.from_cache,
                    points = coalesced.value.trajectory.len(),
                    "Biography ready"
                );
                self.export_metrics(coalesced.from_cache);
            }
            Err(e) => {
                tracing::warn!(key = %key, strategy = %strategy, error = %e, "Biography lookup failed");
            }
        }
        outcome
    }

    fn export_metrics(&self, from_cache: bool) {
        let Ok(metrics) = METRICS.as_ref() else {
            return;
        };
        metrics.record_cache_lookup(from_cache);

        let current = self.coalescer.stats().coalesced_hits;
        let previous = self.exported_coalesced.fetch_max(current, Ordering::Relaxed);
        if current > previous {
            metrics.record_coalesced_waits(current - previous);
        }
    }
}
