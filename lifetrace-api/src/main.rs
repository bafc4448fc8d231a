//! LifeTrace API Server Entry Point
//!
//! Loads configuration, wires the cache, model, pipeline and article
//! source together, and serves the Axum router until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use lifetrace_api::telemetry::{init_tracer, MeteredModel, TelemetryConfig};
use lifetrace_api::{
    create_router, ApiConfig, ApiError, ApiResult, AppState, BiographyService,
    SlidingWindowLimiter, WikipediaSource,
};
use lifetrace_core::{LanguageModel, LifetraceConfig};
use lifetrace_llm::OpenAIChatModel;
use lifetrace_pipeline::ExtractionPipeline;
use lifetrace_storage::resolve_cache_backend;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let config = LifetraceConfig::from_env()?;
    let api_config = ApiConfig::from_env()?;

    let cache = resolve_cache_backend(&config.cache).await?;
    tracing::info!(backend = cache.backend_name(), "Cache backend ready");

    let chat = OpenAIChatModel::from_settings(&config.llm)?;
    let model: Arc<dyn LanguageModel> = Arc::new(MeteredModel::new(Arc::new(chat)));
    let pipeline = ExtractionPipeline::new(model, config.pipeline.clone())?;

    let wikipedia = Arc::new(WikipediaSource::new(
        api_config.wikipedia_timeout,
        &api_config.wikipedia_user_agent,
    )?);
    let service = Arc::new(BiographyService::new(
        wikipedia.clone(),
        pipeline,
        cache.clone(),
        &config.cache,
    ));
    let limiter = Arc::new(SlidingWindowLimiter::new(&config.rate_limit));

    let state = AppState::new(service, wikipedia, limiter);
    let app = create_router(state, &api_config);

    let addr = api_config.bind_addr;
    tracing::info!(%addr, version = %telemetry_config.service_version, "Starting LifeTrace API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    cache.shutdown().await;
    tracing::info!("Server stopped");

    served.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
