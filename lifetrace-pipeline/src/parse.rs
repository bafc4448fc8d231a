//! Model output parsing and normalization.
//!
//! Models are asked for `{"life_trajectory": {...}}` but sometimes answer
//! with the inner object directly, wrap the JSON in a markdown fence, or
//! emit numbers where strings were requested. All of that is accepted here,
//! once, so the rest of the pipeline only sees [`BiographyResult`].

use lifetrace_core::{BiographyResult, Coordinates, TrajectoryPoint};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Characters of a bad payload kept in the log line.
const PREVIEW_CHARS: usize = 200;

/// Outcome of parsing one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBiography {
    Structured(BiographyResult),
    Malformed { reason: String },
}

impl ParsedBiography {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    /// The parsed result, or the canonical empty result.
    pub fn into_result(self) -> BiographyResult {
        match self {
            Self::Structured(result) => result,
            Self::Malformed { .. } => BiographyResult::empty(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { life_trajectory: RawBiography },
    Flat(FlatBiography),
}

#[derive(Deserialize)]
struct RawBiography {
    #[serde(default)]
    person_name: Value,
    #[serde(default)]
    trajectory: Value,
}

#[derive(Deserialize)]
struct FlatBiography {
    person_name: Value,
    #[serde(default)]
    trajectory: Value,
}

/// Remove a surrounding markdown code fence, with or without a `json` tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a trajectory response.
///
/// Entries that are not objects or lack a location are skipped. Failures
/// are logged with a preview of the payload.
pub fn parse_biography(raw: &str) -> ParsedBiography {
    let body = strip_code_fence(raw);
    let envelope = match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                error = %e,
                preview = %preview(raw),
                "Model output is not a recognizable trajectory"
            );
            return ParsedBiography::Malformed {
                reason: e.to_string(),
            };
        }
    };

    let (person_name, trajectory) = match envelope {
        Envelope::Wrapped { life_trajectory } => {
            (life_trajectory.person_name, life_trajectory.trajectory)
        }
        Envelope::Flat(flat) => (flat.person_name, flat.trajectory),
    };

    let points = match trajectory {
        Value::Array(items) => items.iter().filter_map(point_from_value).collect(),
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(
                preview = %preview(&other.to_string()),
                "Trajectory field is not a list, ignoring it"
            );
            Vec::new()
        }
    };

    ParsedBiography::Structured(BiographyResult::new(scalar_text(&person_name), points))
}

/// Parse a single-place coordinate response.
pub fn parse_coordinates(raw: &str) -> Option<Coordinates> {
    let value: Value = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, preview = %preview(raw), "Unparseable coordinates");
            return None;
        }
    };
    coordinates_from_value(&value).or_else(|| value.get("coordinates").and_then(coordinates_from_value))
}

/// Parse a batch location response into `(name, coordinates)` pairs.
///
/// Accepts `{"locations": [...]}` or a bare list. Entries without a name or
/// with unusable coordinates are dropped.
pub fn parse_locations(raw: &str) -> Vec<(String, Coordinates)> {
    let value: Value = match serde_json::from_str(strip_code_fence(raw)) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, preview = %preview(raw), "Unparseable location list");
            return Vec::new();
        }
    };
    let entries = match value.get("locations").unwrap_or(&value) {
        Value::Array(entries) => entries,
        _ => return Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| {
            let fields = entry.as_object()?;
            let name = ["name", "location", "place"]
                .iter()
                .map(|key| field_text(fields, key))
                .find(|name| !name.is_empty())?;
            let coordinates = coordinates_from_value(entry)
                .or_else(|| fields.get("coordinates").and_then(coordinates_from_value))?;
            Some((name, coordinates))
        })
        .collect()
}

fn point_from_value(value: &Value) -> Option<TrajectoryPoint> {
    let fields = value.as_object()?;
    let location = field_text(fields, "location");
    if location.is_empty() {
        return None;
    }
    let point = TrajectoryPoint::new(
        field_text(fields, "time"),
        location,
        field_text(fields, "description"),
    );
    match fields.get("coordinates").and_then(coordinates_from_value) {
        Some(coordinates) => Some(point.with_coordinates(coordinates)),
        None => Some(point),
    }
}

/// Accepts `{longitude, latitude}` (or `lng`/`lon`/`lat`) objects and
/// `[longitude, latitude]` pairs. Out-of-range pairs are rejected.
fn coordinates_from_value(value: &Value) -> Option<Coordinates> {
    let (longitude, latitude) = match value {
        Value::Object(fields) => {
            let longitude = ["longitude", "lng", "lon"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(number))?;
            let latitude = ["latitude", "lat"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(number))?;
            (longitude, latitude)
        }
        Value::Array(pair) if pair.len() == 2 => (number(&pair[0])?, number(&pair[1])?),
        _ => return None,
    };
    let coordinates = Coordinates::new(longitude, latitude);
    coordinates.is_valid().then_some(coordinates)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_text(fields: &Map<String, Value>, key: &str) -> String {
    fields.get(key).map(scalar_text).unwrap_or_default()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifetrace_test_utils::fixtures::trajectory_response;

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_wrapped_envelope() {
        let raw = trajectory_response("Su Shi", &[("1037", "Meishan", "born"), ("1057", "Kaifeng", "exam")]);
        let result = parse_biography(&raw).into_result();
        assert_eq!(result.person_name, "Su Shi");
        assert_eq!(result.trajectory.len(), 2);
        assert_eq!(result.trajectory[1].location, "Kaifeng");
    }

    #[test]
    fn test_parse_flat_envelope_in_fence() {
        let raw = "```json\n{\"person_name\": \"Li Bai\", \"trajectory\": [{\"time\": 701, \"location\": \"Suyab\"}]}\n```";
        let result = parse_biography(raw).into_result();
        assert_eq!(result.person_name, "Li Bai");
        assert_eq!(result.trajectory[0].time, "701");
        assert_eq!(result.trajectory[0].description, "");
    }

    #[test]
    fn test_parse_reads_coordinates_in_both_shapes() {
        let raw = r#"{"life_trajectory": {"person_name": "X", "trajectory": [
            {"time": "1", "location": "A", "coordinates": {"longitude": 120.1, "latitude": 30.2}},
            {"time": "2", "location": "B", "coordinates": [103.8, 30.0]},
            {"time": "3", "location": "C", "coordinates": {"longitude": 500, "latitude": 0}}
        ]}}"#;
        let result = parse_biography(raw).into_result();
        assert_eq!(result.trajectory[0].coordinates, Some(Coordinates::new(120.1, 30.2)));
        assert_eq!(result.trajectory[1].coordinates, Some(Coordinates::new(103.8, 30.0)));
        assert_eq!(result.trajectory[2].coordinates, None);
    }

    #[test]
    fn test_parse_skips_unusable_entries() {
        let raw = r#"{"life_trajectory": {"person_name": "X", "trajectory": ["text", {"time": "1"}, {"time": "2", "location": "B"}]}}"#;
        let result = parse_biography(raw).into_result();
        assert_eq!(result.trajectory.len(), 1);
        assert_eq!(result.trajectory[0].location, "B");
    }

    #[test]
    fn test_malformed_output_becomes_empty_result() {
        let parsed = parse_biography("I could not find any information.");
        assert!(parsed.is_malformed());
        assert_eq!(parsed.into_result(), BiographyResult::empty());

        let parsed = parse_biography(r#"{"unexpected": true}"#);
        assert!(parsed.is_malformed());
    }

    #[test]
    fn test_missing_trajectory_is_empty_list() {
        let result = parse_biography(r#"{"life_trajectory": {"person_name": "X"}}"#).into_result();
        assert_eq!(result.person_name, "X");
        assert!(result.trajectory.is_empty());
    }

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(
            parse_coordinates(r#"{"longitude": 116.4, "latitude": 39.9}"#),
            Some(Coordinates::new(116.4, 39.9))
        );
        assert_eq!(
            parse_coordinates("```json\n{\"coordinates\": {\"lng\": \"114.3\", \"lat\": \"30.6\"}}\n```"),
            Some(Coordinates::new(114.3, 30.6))
        );
        assert_eq!(parse_coordinates("unknown"), None);
    }

    #[test]
    fn test_parse_locations() {
        let raw = r#"{"locations": [
            {"name": "Meishan", "longitude": 103.8, "latitude": 30.1},
            {"place": "Danzhou", "coordinates": [109.6, 19.5]},
            {"name": "Atlantis"},
            {"longitude": 1.0, "latitude": 1.0}
        ]}"#;
        let located = parse_locations(raw);
        assert_eq!(
            located,
            vec![
                ("Meishan".to_string(), Coordinates::new(103.8, 30.1)),
                ("Danzhou".to_string(), Coordinates::new(109.6, 19.5)),
            ]
        );
        assert_eq!(parse_locations(r#"[{"name": "A", "lng": 1, "lat": 2}]"#).len(), 1);
        assert!(parse_locations("no idea").is_empty());
    }
}
