//! Shared harness for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use lifetrace_api::{
    create_router, ApiConfig, AppState, BiographyService, SlidingWindowLimiter, Suggestion,
    SuggestionSource,
};
use lifetrace_core::{CacheSettings, LifetraceResult, PipelineSettings, RateLimitSettings};
use lifetrace_pipeline::{prompts, ExtractionPipeline};
use lifetrace_test_utils::fixtures::{locations_response, trajectory_response};
use lifetrace_test_utils::{MemoryCache, ScriptedModel, StubArticleSource};
use serde_json::Value;
use tower::ServiceExt;

pub const SU_SHI_PLACES: &[(&str, f64, f64)] = &[
    ("Meishan", 103.83, 30.05),
    ("Kaifeng", 114.31, 34.80),
    ("Huangzhou", 114.87, 30.45),
];

/// Model that answers every extraction prompt with the same three stops
/// and geocodes them on request.
pub fn su_shi_model() -> ScriptedModel {
    ScriptedModel::new(|request| {
        if request.system_prompt.as_deref() == Some(prompts::LOCATE_SYSTEM_PROMPT) {
            return Ok(locations_response(SU_SHI_PLACES));
        }
        Ok(trajectory_response(
            "Su Shi",
            &[
                ("1037", "Meishan", "Born in Meishan"),
                ("1057", "Kaifeng", "Passed the imperial examination"),
                ("1080", "Huangzhou", "Exiled after the poetry trial"),
            ],
        ))
    })
}

/// Suggestion source answering from a fixed list.
pub struct StaticSuggestions {
    pub names: Vec<String>,
}

#[async_trait]
impl SuggestionSource for StaticSuggestions {
    async fn search_suggestions(
        &self,
        query: &str,
        _language: &str,
        limit: usize,
    ) -> LifetraceResult<Vec<Suggestion>> {
        Ok(self
            .names
            .iter()
            .filter(|name| name.to_lowercase().contains(&query.to_lowercase()))
            .take(limit)
            .map(|name| Suggestion {
                name: name.clone(),
                description: String::new(),
                popularity: 1.0,
            })
            .collect())
    }
}

pub struct TestApp {
    pub service: Arc<BiographyService>,
    pub source: Arc<StubArticleSource>,
    pub model: Arc<ScriptedModel>,
    pub cache: Arc<MemoryCache>,
}

impl TestApp {
    pub fn new(source: StubArticleSource, model: ScriptedModel) -> Self {
        let source = Arc::new(source);
        let model = Arc::new(model);
        let cache = Arc::new(MemoryCache::new());
        let pipeline = ExtractionPipeline::new(model.clone(), PipelineSettings::default())
            .expect("default pipeline settings should be valid");
        let service = Arc::new(BiographyService::new(
            source.clone(),
            pipeline,
            cache.clone(),
            &CacheSettings::default(),
        ));
        Self {
            service,
            source,
            model,
            cache,
        }
    }

    pub fn router(&self, max_requests: u32) -> Router {
        let limiter = Arc::new(SlidingWindowLimiter::new(&RateLimitSettings {
            enabled: true,
            max_requests,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(300),
        }));
        let suggestions = Arc::new(StaticSuggestions {
            names: (1..=15).map(|i| format!("Su Shi {i}")).collect(),
        });
        let state = AppState::new(self.service.clone(), suggestions, limiter);
        create_router(state, &ApiConfig::default())
    }
}

pub fn get(uri: &str, client: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .expect("request should build")
}

pub fn post_json(uri: &str, client: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-forwarded-for", client)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

pub async fn send(router: &Router, request: Request<Body>) -> Result<(Response<Body>, Value), String> {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| e.to_string())?;
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| e.to_string())?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((Response::from_parts(parts, Body::empty()), json))
}
