//! REST API Routes Module
//!
//! All JSON endpoints live under `/api` behind the rate limiter. The
//! Prometheus scrape endpoint sits outside it at `/metrics`.

pub mod biography;
pub mod health;
pub mod search;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    map_response_body::MapResponseBodyLayer,
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::middleware::rate_limit::{
    X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET, X_RATELIMIT_WINDOW,
};
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use biography::create_router as biography_router;
pub use health::create_router as health_router;
pub use search::create_router as search_router;

/// Build the complete application router.
///
/// # Middleware Order (outer to inner)
/// 1. CORS - answers preflight requests
/// 2. HTTP trace spans
/// 3. Observability - request metrics and completion logs
/// 4. Rate limiting (only on /api/*)
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let api_routes = Router::new()
        .merge(biography::create_router())
        .merge(search::create_router())
        .merge(health::create_router())
        .layer(from_fn_with_state(state.limiter.clone(), rate_limit_middleware));

    Router::new()
        .nest("/api", api_routes)
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(build_cors_layer(config))
                .layer(MapResponseBodyLayer::new(axum::body::Body::new))
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(observability_middleware)),
        )
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            X_RATELIMIT_LIMIT,
            X_RATELIMIT_REMAINING,
            X_RATELIMIT_RESET,
            X_RATELIMIT_WINDOW,
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
    let allowed = config.clone();
    cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
            origin
                .to_str()
                .map(|origin| allowed.is_origin_allowed(origin))
                .unwrap_or(false)
        },
    ))
}
