//! HTTP surface tests driven through the full router with `oneshot`.

use axum::http::{header, StatusCode};
use lifetrace_test_utils::fixtures::su_shi_article;
use lifetrace_test_utils::{ScriptedModel, StubArticleSource};
use serde_json::json;

#[path = "support/app.rs"]
mod test_app_support;
use test_app_support::{get, post_json, send, su_shi_model, TestApp, SU_SHI_PLACES};

fn su_shi_app() -> TestApp {
    TestApp::new(StubArticleSource::new(su_shi_article()), su_shi_model())
}

// ============================================================================
// BIOGRAPHY
// ============================================================================

#[tokio::test]
async fn biography_returns_map_ready_payload() -> Result<(), String> {
    let app = su_shi_app();
    let router = app.router(30);

    let (response, body) = send(
        &router,
        post_json("/api/biography", "10.0.0.1", &json!({"name": "Su Shi", "language": "zh"})),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["cached"], json!(false));
    assert_eq!(body["data"]["name"], json!("Su Shi"));

    let coordinates = body["data"]["coordinates"].as_array().ok_or("missing coordinates")?;
    let descriptions = body["data"]["descriptions"].as_array().ok_or("missing descriptions")?;
    assert_eq!(coordinates.len(), SU_SHI_PLACES.len());
    assert_eq!(coordinates.len(), descriptions.len());
    assert_eq!(coordinates[0], json!([103.83, 30.05]));
    assert_eq!(descriptions[0], json!("1037,Born in Meishan"));
    assert!(body["duration_ms"].is_u64());

    let (_, again) = send(
        &router,
        post_json("/api/biography", "10.0.0.1", &json!({"name": "  Su   Shi "})),
    )
    .await?;
    assert_eq!(again["cached"], json!(true));
    assert_eq!(app.source.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_name_is_rejected_before_any_work() -> Result<(), String> {
    let app = su_shi_app();
    let router = app.router(30);

    let (response, body) = send(
        &router,
        post_json("/api/biography", "10.0.0.2", &json!({"name": "<script>alert(1)</script>"})),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!("INVALID_INPUT"));
    assert_eq!(body["details"]["field"], json!("name"));
    assert_eq!(app.source.call_count(), 0);
    assert_eq!(app.model.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_body_and_bad_enums_are_invalid_input() -> Result<(), String> {
    let router = su_shi_app().router(30);

    let (response, body) = send(&router, post_json("/api/biography", "10.0.0.3", &json!({}))).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_INPUT"));

    let (response, body) = send(
        &router,
        post_json("/api/biography", "10.0.0.3", &json!({"name": "Su Shi", "strategy": "guess"})),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], json!("strategy"));

    let (response, body) = send(
        &router,
        post_json(
            "/api/biography",
            "10.0.0.3",
            &json!({"name": "Su Shi", "detail_level": "exhaustive"}),
        ),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["field"], json!("detail_level"));
    Ok(())
}

#[tokio::test]
async fn unknown_person_is_not_found() -> Result<(), String> {
    let app = TestApp::new(StubArticleSource::not_found(), su_shi_model());
    let router = app.router(30);

    let (response, body) = send(
        &router,
        post_json("/api/biography", "10.0.0.4", &json!({"name": "Nobody Atall"})),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("NO_SEARCH_RESULTS"));
    assert!(app.cache.is_empty());
    Ok(())
}

#[tokio::test]
async fn model_failure_is_extraction_failure() -> Result<(), String> {
    let app = TestApp::new(StubArticleSource::new(su_shi_article()), ScriptedModel::failing());
    let router = app.router(30);

    let (response, body) = send(
        &router,
        post_json("/api/biography", "10.0.0.5", &json!({"name": "Su Shi"})),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], json!("BIOGRAPHY_EXTRACTION_FAILED"));
    assert!(app.cache.is_empty());
    Ok(())
}

// ============================================================================
// RATE LIMITING
// ============================================================================

#[tokio::test]
async fn requests_over_the_limit_get_429_with_headers() -> Result<(), String> {
    let router = su_shi_app().router(2);

    for expected_remaining in ["1", "0"] {
        let (response, _) = send(&router, get("/api/health", "10.1.0.1")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-ratelimit-remaining").and_then(|v| v.to_str().ok()),
            Some(expected_remaining)
        );
    }

    let (response, body) = send(&router, get("/api/health", "10.1.0.1")).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], json!("RATE_LIMIT_EXCEEDED"));
    assert_eq!(body["details"]["limit"], json!(2));
    assert_eq!(body["details"]["window"], json!(60));
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        response.headers().get("x-ratelimit-limit").and_then(|v| v.to_str().ok()),
        Some("2")
    );
    assert_eq!(
        response.headers().get("x-ratelimit-window").and_then(|v| v.to_str().ok()),
        Some("60")
    );

    let (other, _) = send(&router, get("/api/health", "10.1.0.2")).await?;
    assert_eq!(other.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn metrics_endpoint_is_not_rate_limited() -> Result<(), String> {
    let router = su_shi_app().router(1);

    for _ in 0..3 {
        let (response, _) = send(&router, get("/metrics", "10.2.0.1")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
    Ok(())
}

// ============================================================================
// HEALTH, STATS, SEARCH
// ============================================================================

#[tokio::test]
async fn health_reports_backend_and_version() -> Result<(), String> {
    let router = su_shi_app().router(30);

    let (response, body) = send(&router, get("/api/health", "10.3.0.1")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["cache_backend"], json!("memory"));
    assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
    assert!(body["uptime_seconds"].is_u64());
    Ok(())
}

#[tokio::test]
async fn cache_stats_reflect_lookups() -> Result<(), String> {
    let router = su_shi_app().router(30);

    send(&router, post_json("/api/biography", "10.4.0.1", &json!({"name": "Su Shi"}))).await?;
    send(&router, post_json("/api/biography", "10.4.0.1", &json!({"name": "Su Shi"}))).await?;

    let (response, body) = send(&router, get("/api/cache/stats", "10.4.0.1")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["backend"], json!("memory"));
    assert_eq!(body["total_entries"], json!(1));
    assert_eq!(body["valid_entries"], json!(1));
    assert_eq!(body["coalescer"]["computations"], json!(1));
    assert_eq!(body["coalescer"]["cache_hits"], json!(1));
    Ok(())
}

#[tokio::test]
async fn search_caps_the_limit_and_tolerates_empty_queries() -> Result<(), String> {
    let router = su_shi_app().router(30);

    let (response, body) = send(&router, get("/api/search?q=su&limit=50", "10.5.0.1")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(10));

    let (_, body) = send(&router, get("/api/search?q=su", "10.5.0.1")).await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(5));

    let (response, body) = send(&router, get("/api/search", "10.5.0.1")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    Ok(())
}
