//! LifeTrace Test Utilities
//!
//! Centralized test infrastructure for the LifeTrace workspace:
//! - Scripted collaborators (language model, article source) with call counters
//! - An in-memory cache backend
//! - Proptest generators for trajectory types
//! - Test fixtures for common scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

// Re-export core types for convenience
pub use lifetrace_core::{
    ArticleSource, BiographyRequest, BiographyResult, Coordinates, DetailLevel, Document,
    ExtractionStrategy, FetchError, LanguageModel, LifetraceError, LifetraceResult, LlmError,
    ModelRequest, TrajectoryPoint,
};
pub use lifetrace_storage::{CacheBackend, CacheStats, StoredEntry};

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

type Responder = dyn Fn(&ModelRequest) -> LifetraceResult<String> + Send + Sync;

/// Language model whose answers come from a closure.
///
/// Records every request and counts calls so tests can assert how many
/// upstream invocations a code path made.
pub struct ScriptedModel {
    responder: Arc<Responder>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> LifetraceResult<String> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            latency: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fail with a server error.
    pub fn failing() -> Self {
        Self::new(|_| {
            Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                status: 500,
                message: "scripted failure".to_string(),
            }
            .into())
        })
    }

    /// Sleep before answering each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, request: &ModelRequest) -> LifetraceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        (self.responder)(request)
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Article source returning fixed text for every subject.
pub struct StubArticleSource {
    article: Option<String>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl StubArticleSource {
    pub fn new(article: impl Into<String>) -> Self {
        Self {
            article: Some(article.into()),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A source that never finds the subject.
    pub fn not_found() -> Self {
        Self {
            article: None,
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleSource for StubArticleSource {
    async fn fetch_article_text(&self, subject_name: &str, language: &str) -> LifetraceResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.article.clone().ok_or_else(|| {
            FetchError::NotFound {
                subject: subject_name.to_string(),
                language: language.to_string(),
            }
            .into()
        })
    }

    fn source_name(&self) -> &str {
        "stub"
    }
}

// ============================================================================
// MEMORY CACHE
// ============================================================================

/// In-process cache backend with the same expiry semantics as the real ones.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, StoredEntry>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let live = self
            .entries
            .get(key)
            .map(|entry| (!entry.is_expired()).then(|| entry.data.clone()));
        match live {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some(None) => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        self.entries
            .insert(key.to_string(), StoredEntry::new(value.clone(), ttl));
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn sweep_expired(&self) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        (before - self.entries.len()) as u64
    }

    async fn stats(&self) -> CacheStats {
        let total = self.entries.len() as u64;
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .count() as u64;
        CacheStats {
            backend: self.backend_name().to_string(),
            total_entries: total,
            valid_entries: total - expired,
            expired_entries: expired,
            size_bytes: 0,
            hits: self.hits.load(Ordering::Relaxed) as u64,
            misses: self.misses.load(Ordering::Relaxed) as u64,
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for trajectory types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a year-like time label.
    pub fn arb_time() -> impl Strategy<Value = String> {
        (1000u32..2000).prop_map(|year| year.to_string())
    }

    /// Generate a place name from a small pool so duplicates are common.
    pub fn arb_location() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "Meishan", "Kaifeng", "Hangzhou", "Mizhou", "Xuzhou", "Huangzhou", "Huizhou",
            "Danzhou", "Changzhou",
        ])
        .prop_map(str::to_string)
    }

    pub fn arb_coordinates() -> impl Strategy<Value = Coordinates> {
        (-180.0f64..=180.0, -90.0f64..=90.0).prop_map(|(lon, lat)| Coordinates::new(lon, lat))
    }

    /// Generate a TrajectoryPoint, with or without coordinates.
    pub fn arb_trajectory_point() -> impl Strategy<Value = TrajectoryPoint> {
        (
            arb_time(),
            arb_location(),
            "[a-z ]{0,30}",
            proptest::option::of(arb_coordinates()),
        )
            .prop_map(|(time, location, description, coordinates)| TrajectoryPoint {
                time,
                location,
                description,
                coordinates,
            })
    }

    /// Generate a trajectory of up to `max_len` points.
    pub fn arb_trajectory(max_len: usize) -> impl Strategy<Value = Vec<TrajectoryPoint>> {
        prop::collection::vec(arb_trajectory_point(), 0..=max_len)
    }

    /// Generate article-like text: paragraphs of sentences separated by blank lines.
    pub fn arb_article_text() -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop::collection::vec("[A-Za-z]{1,10}( [A-Za-z]{1,10}){2,12}\\.", 1..8)
                .prop_map(|sentences| sentences.join(" ")),
            1..12,
        )
        .prop_map(|paragraphs| paragraphs.join("\n\n"))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// A five-paragraph article about Su Shi; every paragraph exceeds 200 characters.
    pub fn su_shi_article() -> String {
        [
            "Su Shi, also known as Su Dongpo, was born in 1037 in Meishan, a county in the \
             Sichuan basin of the Song empire. He grew up in a literary family, studied the \
             classics under his father Su Xun, and was widely regarded as a prodigy from an \
             early age by the scholars of the region.",
            "In 1057 Su Shi travelled to the capital Kaifeng with his father and his brother \
             Su Zhe to sit the imperial examination. He passed with distinction, impressing the \
             examiner Ouyang Xiu, and entered the civil service, beginning a long career that \
             would take him across the empire.",
            "From 1071 he served as vice-prefect of Hangzhou, where he built the causeway on \
             West Lake that still bears his name. Later postings took him to Mizhou in 1074 and \
             to Xuzhou in 1077, where he organised the defence of the city against a great \
             flood of the Yellow River.",
            "After the Crow Terrace poetry trial of 1079 he was banished to Huangzhou, arriving \
             in 1080. There he farmed a plot of land on an eastern slope, took the name Dongpo, \
             and wrote some of his most celebrated works, including the Odes on the Red Cliff \
             and many letters to friends.",
            "In his final years political reversals sent him to Huizhou in 1094 and then to \
             Danzhou on Hainan island in 1097. Pardoned in 1100, he began the long journey \
             north but fell ill on the way and died in Changzhou in 1101, mourned by students \
             and officials throughout the empire.",
        ]
        .join("\n\n")
    }

    /// Render a model response in the canonical extraction shape.
    pub fn trajectory_response(person_name: &str, points: &[(&str, &str, &str)]) -> String {
        let trajectory: Vec<Value> = points
            .iter()
            .map(|(time, location, description)| {
                serde_json::json!({
                    "time": time,
                    "location": location,
                    "description": description,
                })
            })
            .collect();
        serde_json::json!({
            "life_trajectory": {
                "person_name": person_name,
                "trajectory": trajectory,
            }
        })
        .to_string()
    }

    /// Render a coordinate lookup response.
    pub fn coordinates_response(longitude: f64, latitude: f64) -> String {
        serde_json::json!({"longitude": longitude, "latitude": latitude}).to_string()
    }

    /// Render a batch location response.
    pub fn locations_response(places: &[(&str, f64, f64)]) -> String {
        let locations: Vec<Value> = places
            .iter()
            .map(|(name, longitude, latitude)| {
                serde_json::json!({"name": name, "longitude": longitude, "latitude": latitude})
            })
            .collect();
        serde_json::json!({ "locations": locations }).to_string()
    }

    pub fn su_shi_request() -> BiographyRequest {
        BiographyRequest::new("Su Shi", "zh", DetailLevel::Medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_counts_and_records() {
        let model = ScriptedModel::always("hello");
        let request = ModelRequest::new("prompt").with_system_prompt("system");

        assert_eq!(model.invoke(&request).await.ok().as_deref(), Some("hello"));
        assert_eq!(model.call_count(), 1);
        assert_eq!(model.requests(), vec![request]);
    }

    #[tokio::test]
    async fn test_stub_source_not_found() {
        let source = StubArticleSource::not_found();
        let result = source.fetch_article_text("Nobody", "en").await;
        assert!(matches!(
            result,
            Err(LifetraceError::Fetch(FetchError::NotFound { .. }))
        ));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryCache::new();
        assert!(
            cache
                .set("k", &serde_json::json!(1), Some(Duration::from_millis(30)))
                .await
        );
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_fixture_paragraphs_are_long() {
        for paragraph in fixtures::su_shi_article().split("\n\n") {
            assert!(paragraph.chars().count() > 200, "short paragraph: {paragraph}");
        }
    }
}
