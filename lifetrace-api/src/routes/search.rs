//! Search REST API Routes
//!
//! Name suggestions for the search box. A failing upstream yields an empty
//! list rather than an error, since suggestions are advisory.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::validate_language;
use crate::wiki::{Suggestion, SuggestionSource};

pub const DEFAULT_SUGGESTIONS: usize = 5;
pub const MAX_SUGGESTIONS: usize = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<Suggestion>,
}

/// GET /api/search - Name suggestions for partial input
pub async fn search(
    State(source): State<Arc<dyn SuggestionSource>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Ok(Json(SearchResponse {
            success: true,
            data: Vec::new(),
        }));
    }

    let language = validate_language(params.language.as_deref().unwrap_or("zh"))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SUGGESTIONS)
        .clamp(1, MAX_SUGGESTIONS);

    let data = match source.search_suggestions(query, &language, limit).await {
        Ok(suggestions) => suggestions,
        Err(e) => {
            tracing::warn!(query = %query, error = %e, "Suggestion lookup failed");
            Vec::new()
        }
    };

    Ok(Json(SearchResponse {
        success: true,
        data,
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/search", get(search))
}
