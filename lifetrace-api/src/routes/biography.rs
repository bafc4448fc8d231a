//! Biography REST API Routes
//!
//! `POST /api/biography` validates the request, runs the coalesced lookup,
//! and flattens the trajectory into the map-ready shape the front end draws.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use lifetrace_core::{
    BiographyRequest, BiographyResult, DetailLevel, ExtractionStrategy, TrajectoryPoint,
    UNKNOWN_PERSON,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::service::BiographyService;
use crate::state::AppState;
use crate::validation::{validate_language, validate_person_name};

// ============================================================================
// TYPES
// ============================================================================

fn default_language() -> String {
    "zh".to_string()
}

/// Body of `POST /api/biography`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiographyBody {
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// `basic`, `medium` or `detailed`. Defaults to `medium`.
    #[serde(default)]
    pub detail_level: Option<String>,
    /// Strategy name or legacy numeric mode. Defaults to the configured one.
    #[serde(default)]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiographyData {
    pub name: String,
    pub trajectory: Vec<TrajectoryPoint>,
    /// `[longitude, latitude]` per located point, in trajectory order.
    pub coordinates: Vec<[f64; 2]>,
    /// `"time,description"` aligned with `coordinates`.
    pub descriptions: Vec<String>,
}

impl BiographyData {
    /// Build the response payload, naming the subject after the request
    /// when extraction could not tell who the article was about.
    pub fn from_result(result: BiographyResult, requested_name: &str) -> Self {
        let name = if result.person_name.is_empty() || result.person_name == UNKNOWN_PERSON {
            requested_name.to_string()
        } else {
            result.person_name
        };

        let (coordinates, descriptions): (Vec<[f64; 2]>, Vec<String>) = result
            .trajectory
            .iter()
            .filter_map(|point| {
                let c = point.coordinates?;
                Some((
                    [c.longitude, c.latitude],
                    format!("{},{}", point.time, point.description),
                ))
            })
            .unzip();

        Self {
            name,
            trajectory: result.trajectory,
            coordinates,
            descriptions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiographyResponse {
    pub success: bool,
    pub data: BiographyData,
    /// Whether the trajectory was served from the cache.
    pub cached: bool,
    pub duration_ms: u64,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/biography - Trajectory of a historical figure
pub async fn get_biography(
    State(service): State<Arc<BiographyService>>,
    payload: Result<Json<BiographyBody>, JsonRejection>,
) -> ApiResult<Json<BiographyResponse>> {
    let start = Instant::now();
    let Json(body) =
        payload.map_err(|rejection| ApiError::new(ErrorCode::InvalidInput, rejection.body_text()))?;

    let name = validate_person_name(&body.name)?;
    let language = validate_language(&body.language)?;
    let detail_level = match body.detail_level.as_deref() {
        Some(raw) => DetailLevel::from_str(raw)
            .map_err(|e| ApiError::invalid_field("detail_level", e.to_string()))?,
        None => DetailLevel::default(),
    };
    let strategy = body
        .strategy
        .as_deref()
        .map(ExtractionStrategy::from_str)
        .transpose()
        .map_err(|e| ApiError::invalid_field("strategy", e.to_string()))?;

    let request = BiographyRequest::new(&name, &language, detail_level);
    let outcome = service.get_biography(&request, strategy).await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        name = %name,
        language = %language,
        cached = outcome.from_cache,
        points = outcome.value.trajectory.len(),
        duration_ms,
        "Biography served"
    );

    Ok(Json(BiographyResponse {
        success: true,
        data: BiographyData::from_result(outcome.value, request.subject_name()),
        cached: outcome.from_cache,
        duration_ms,
    }))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/biography", post(get_biography))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifetrace_core::Coordinates;

    #[test]
    fn test_body_defaults() -> Result<(), String> {
        let body: BiographyBody =
            serde_json::from_str(r#"{"name": "苏轼"}"#).map_err(|e| e.to_string())?;
        assert_eq!(body.language, "zh");
        assert_eq!(body.detail_level, None);
        assert_eq!(body.strategy, None);
        Ok(())
    }

    #[test]
    fn test_data_aligns_coordinates_with_descriptions() {
        let result = BiographyResult::new(
            "Su Shi",
            vec![
                TrajectoryPoint::new("1037", "Meishan", "Born")
                    .with_coordinates(Coordinates::new(103.8, 30.1)),
                TrajectoryPoint::new("1071", "Somewhere", "Unlocated"),
                TrajectoryPoint::new("1079", "Huangzhou", "Exiled")
                    .with_coordinates(Coordinates::new(114.9, 30.4)),
            ],
        );

        let data = BiographyData::from_result(result, "苏轼");
        assert_eq!(data.name, "Su Shi");
        assert_eq!(data.trajectory.len(), 3);
        assert_eq!(data.coordinates, vec![[103.8, 30.1], [114.9, 30.4]]);
        assert_eq!(data.descriptions, vec!["1037,Born", "1079,Exiled"]);
    }

    #[test]
    fn test_unknown_person_takes_requested_name() {
        let data = BiographyData::from_result(BiographyResult::new(UNKNOWN_PERSON, vec![]), "苏轼");
        assert_eq!(data.name, "苏轼");
        assert!(data.coordinates.is_empty());
    }
}
