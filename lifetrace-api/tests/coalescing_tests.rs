//! End-to-end coalescing through the biography service.
//!
//! Two concurrent lookups for the same person must share one article fetch
//! and one pipeline run, and both must see the same trajectory.

use std::time::Duration;

use lifetrace_core::ExtractionStrategy;
use lifetrace_test_utils::fixtures::{su_shi_article, su_shi_request};
use lifetrace_test_utils::StubArticleSource;

#[path = "support/app.rs"]
mod test_app_support;
use test_app_support::{su_shi_model, TestApp};

/// Model calls made by one uncontended lookup.
async fn calls_for_one_run() -> Result<usize, String> {
    let app = TestApp::new(StubArticleSource::new(su_shi_article()), su_shi_model());
    app.service
        .get_biography(&su_shi_request(), None)
        .await
        .map_err(|e| e.to_string())?;
    Ok(app.model.call_count())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_share_one_computation() -> Result<(), String> {
    let expected_calls = calls_for_one_run().await?;
    assert!(expected_calls > 0);

    let app = TestApp::new(
        StubArticleSource::new(su_shi_article()).with_latency(Duration::from_millis(150)),
        su_shi_model(),
    );
    let request = su_shi_request();

    let (first, second) = tokio::join!(
        app.service.get_biography(&request, None),
        app.service.get_biography(&request, None),
    );
    let first = first.map_err(|e| e.to_string())?;
    let second = second.map_err(|e| e.to_string())?;

    assert_eq!(app.source.call_count(), 1);
    assert_eq!(app.model.call_count(), expected_calls);
    assert_eq!(first.value, second.value);
    assert_eq!(
        [first.from_cache, second.from_cache].iter().filter(|c| **c).count(),
        1,
        "exactly one caller should compute"
    );
    assert_eq!(app.cache.len(), 1);

    let stats = app.service.coalescer_stats();
    assert_eq!(stats.computations, 1);
    assert_eq!(stats.coalesced_hits, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_lookups_fetch_once() -> Result<(), String> {
    let app = TestApp::new(
        StubArticleSource::new(su_shi_article()).with_latency(Duration::from_millis(100)),
        su_shi_model(),
    );

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = app.service.clone();
        handles.push(tokio::spawn(async move {
            service.get_biography(&su_shi_request(), None).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        let outcome = handle.await.map_err(|e| e.to_string())?;
        results.push(outcome.map_err(|e| e.to_string())?);
    }

    assert_eq!(app.source.call_count(), 1);
    assert_eq!(results.iter().filter(|r| !r.from_cache).count(), 1);
    assert!(results.windows(2).all(|pair| pair[0].value == pair[1].value));
    Ok(())
}

#[tokio::test]
async fn trajectory_is_geocoded_before_caching() -> Result<(), String> {
    let app = TestApp::new(StubArticleSource::new(su_shi_article()), su_shi_model());

    let outcome = app
        .service
        .get_biography(&su_shi_request(), Some(ExtractionStrategy::SingleShot))
        .await
        .map_err(|e| e.to_string())?;

    assert!(!outcome.value.trajectory.is_empty());
    assert!(outcome
        .value
        .trajectory
        .iter()
        .all(|point| point.coordinates.is_some()));

    let cached = app
        .service
        .get_biography(&su_shi_request(), None)
        .await
        .map_err(|e| e.to_string())?;
    assert!(cached.from_cache);
    assert_eq!(cached.value, outcome.value);
    Ok(())
}
