//! Prometheus Metrics Definitions
//!
//! Defines all LifeTrace metrics with their labels and exposes the
//! `/metrics` endpoint for Prometheus scraping.

use async_trait::async_trait;
use axum::{http::StatusCode, response::IntoResponse};
use lifetrace_core::{LanguageModel, LifetraceResult, ModelRequest};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s, 30s, 60s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Model call latency buckets (seconds)
const LLM_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0, 60.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<LifetraceMetrics>> = Lazy::new(LifetraceMetrics::new);

/// Container for all LifeTrace metrics.
#[derive(Clone)]
pub struct LifetraceMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Biography cache lookups - labels: outcome (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Callers served by another caller's computation
    pub coalesced_waits_total: Counter,

    /// Model calls - labels: model, outcome (success/error)
    pub llm_calls_total: CounterVec,

    /// Model call duration histogram - labels: model
    pub llm_call_duration_seconds: HistogramVec,

    /// Requests rejected by the rate limiter
    pub rate_limit_rejections_total: Counter,
}

impl LifetraceMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "lifetrace_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_failed("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "lifetrace_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_failed("http_request_duration_seconds", e))?,

            cache_lookups_total: register_counter_vec!(
                "lifetrace_cache_lookups_total",
                "Biography lookups by cache outcome",
                &["outcome"]
            )
            .map_err(|e| registration_failed("cache_lookups_total", e))?,

            coalesced_waits_total: register_counter!(
                "lifetrace_coalesced_waits_total",
                "Lookups answered by an identical in-flight computation"
            )
            .map_err(|e| registration_failed("coalesced_waits_total", e))?,

            llm_calls_total: register_counter_vec!(
                "lifetrace_llm_calls_total",
                "Language model calls by outcome",
                &["model", "outcome"]
            )
            .map_err(|e| registration_failed("llm_calls_total", e))?,

            llm_call_duration_seconds: register_histogram_vec!(
                "lifetrace_llm_call_duration_seconds",
                "Language model call duration in seconds",
                &["model"],
                LLM_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_failed("llm_call_duration_seconds", e))?,

            rate_limit_rejections_total: register_counter!(
                "lifetrace_rate_limit_rejections_total",
                "Requests rejected by the rate limiter"
            )
            .map_err(|e| registration_failed("rate_limit_rejections_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_coalesced_waits(&self, count: u64) {
        self.coalesced_waits_total.inc_by(count as f64);
    }

    pub fn record_llm_call(&self, model: &str, success: bool, duration_secs: f64) {
        let outcome = if success { "success" } else { "error" };
        self.llm_calls_total
            .with_label_values(&[model, outcome])
            .inc();
        self.llm_call_duration_seconds
            .with_label_values(&[model])
            .observe(duration_secs);
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejections_total.inc();
    }
}

fn registration_failed(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

// ============================================================================
// METERED MODEL
// ============================================================================

/// Wraps a [`LanguageModel`] and records every call.
pub struct MeteredModel {
    inner: Arc<dyn LanguageModel>,
}

impl MeteredModel {
    pub fn new(inner: Arc<dyn LanguageModel>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LanguageModel for MeteredModel {
    async fn invoke(&self, request: &ModelRequest) -> LifetraceResult<String> {
        let start = Instant::now();
        let result = self.inner.invoke(request).await;
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_llm_call(
                self.inner.model_id(),
                result.is_ok(),
                start.elapsed().as_secs_f64(),
            );
        }
        result
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
