//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Wraps every request in a tracing span, records Prometheus metrics, and
//! logs completion.

use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::METRICS;

/// Label used for requests that matched no route.
const UNMATCHED_PATH: &str = "unmatched";

/// Route template for metrics and spans, e.g. `/api/biography`.
///
/// Using the template rather than the raw path keeps label cardinality
/// bounded.
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string())
}

/// Observability middleware for Axum.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = route_label(&request);

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(method.as_str(), &route, status.as_u16(), duration.as_secs_f64());
    }

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis(),
            "Request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/items/:id", get(|| async { "item" }))
            .layer(middleware::from_fn(observability_middleware))
    }

    #[tokio::test]
    async fn test_requests_are_labelled_by_route_template() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        let before = metrics
            .http_requests_total
            .with_label_values(&["GET", "/api/items/:id", "200"])
            .get();

        for id in ["1", "2"] {
            let request = axum::http::Request::builder()
                .uri(format!("/api/items/{id}"))
                .body(Body::empty())
                .map_err(|e| e.to_string())?;
            let response = app().oneshot(request).await.map_err(|e| e.to_string())?;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let after = metrics
            .http_requests_total
            .with_label_values(&["GET", "/api/items/:id", "200"])
            .get();
        assert!(after >= before + 2.0);
        Ok(())
    }
}
