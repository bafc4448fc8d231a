//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use crate::middleware::SlidingWindowLimiter;
use crate::service::BiographyService;
use crate::wiki::SuggestionSource;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BiographyService>,
    pub suggestions: Arc<dyn SuggestionSource>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        service: Arc<BiographyService>,
        suggestions: Arc<dyn SuggestionSource>,
        limiter: Arc<SlidingWindowLimiter>,
    ) -> Self {
        Self {
            service,
            suggestions,
            limiter,
            start_time: Instant::now(),
        }
    }
}

macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<AppState> for $type {
            fn from_ref(state: &AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}

impl_from_ref!(Arc<BiographyService>, service);
impl_from_ref!(Arc<dyn SuggestionSource>, suggestions);
impl_from_ref!(Arc<SlidingWindowLimiter>, limiter);
impl_from_ref!(Instant, start_time);
