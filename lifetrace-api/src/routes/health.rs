//! Health Check Endpoints
//!
//! - /api/health - Liveness with version, uptime and cache backend
//! - /api/cache/stats - Cache contents and coalescer counters

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, routing::get, Json, Router};
use lifetrace_storage::{CacheStats, CoalescerStats};
use serde::{Deserialize, Serialize};

use crate::service::BiographyService;
use crate::state::AppState;

pub const SERVICE_NAME: &str = "LifeTrace API";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub cache_backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub cache: CacheStats,
    pub hit_rate: f64,
    pub coalescer: CoalescerStats,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health
pub async fn health(
    State(service): State<Arc<BiographyService>>,
    State(start_time): State<Instant>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        cache_backend: service.cache().backend_name().to_string(),
    })
}

/// GET /api/cache/stats
pub async fn cache_stats(State(service): State<Arc<BiographyService>>) -> Json<CacheStatsResponse> {
    let cache = service.cache().stats().await;
    Json(CacheStatsResponse {
        hit_rate: cache.hit_rate(),
        cache,
        coalescer: service.coalescer_stats(),
    })
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/cache/stats", get(cache_stats))
}
