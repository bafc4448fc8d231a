//! LifeTrace API - HTTP Service Layer
//!
//! Axum endpoints that turn a person's name into a geolocated life
//! trajectory. A request is validated, rate limited per client, and then
//! served by [`BiographyService`], which fetches the Wikipedia article and
//! runs the extraction pipeline at most once per cache key at a time.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod validation;
pub mod wiki;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{rate_limit_middleware, SlidingWindowLimiter};
pub use routes::create_router;
pub use service::BiographyService;
pub use state::AppState;
pub use validation::{validate_language, validate_person_name};
pub use wiki::{Suggestion, SuggestionSource, WikipediaSource};
