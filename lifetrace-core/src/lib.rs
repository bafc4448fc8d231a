//! LifeTrace Core - Entity Types
//!
//! Data structures shared by every other crate: the trajectory model, the
//! request identity used as a cache key, errors, configuration, and the
//! collaborator traits for the language model and the article source.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod config;
pub mod error;
pub mod llm;
pub mod source;

pub use config::*;
pub use error::*;
pub use llm::{LanguageModel, ModelRequest};
pub use source::ArticleSource;

/// Person name used when no chunk produced one.
pub const UNKNOWN_PERSON: &str = "Unknown";

// ============================================================================
// TRAJECTORY TYPES
// ============================================================================

/// Geographic position of a place, WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Whether both components fall inside valid WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// One stop in a subject's life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl TrajectoryPoint {
    pub fn new(
        time: impl Into<String>,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            time: time.into(),
            location: location.into(),
            description: description.into(),
            coordinates: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    /// Compound identity used for deduplication.
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.time.as_str(), self.location.as_str())
    }
}

/// The cached artifact: a subject and their ordered trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiographyResult {
    #[serde(default)]
    pub person_name: String,
    #[serde(default)]
    pub trajectory: Vec<TrajectoryPoint>,
}

impl BiographyResult {
    pub fn new(person_name: impl Into<String>, trajectory: Vec<TrajectoryPoint>) -> Self {
        Self {
            person_name: person_name.into(),
            trajectory,
        }
    }

    /// The canonical empty shape used for unusable model output.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.person_name.is_empty() && self.trajectory.is_empty()
    }
}

/// A segment of article text handed to one extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    content: String,
    sequence_index: usize,
    length: usize,
}

impl Document {
    pub fn new(content: impl Into<String>, sequence_index: usize) -> Self {
        let content = content.into();
        let length = content.chars().count();
        Self {
            content,
            sequence_index,
            length,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    /// Length in characters, not bytes.
    pub fn length(&self) -> usize {
        self.length
    }
}

// ============================================================================
// REQUEST IDENTITY
// ============================================================================

/// How much detail the caller wants in the trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Basic,
    #[default]
    Medium,
    Detailed,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Medium => "medium",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an enum from its string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for DetailLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "medium" => Ok(Self::Medium),
            "detailed" => Ok(Self::Detailed),
            _ => Err(ParseEnumError {
                kind: "detail level",
                value: s.to_string(),
            }),
        }
    }
}

/// Identity of one biography lookup.
///
/// Two requests that differ only in surrounding or repeated whitespace in
/// the name, or in the case of the language tag, are the same request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BiographyRequest {
    subject_name: String,
    language: String,
    detail_level: DetailLevel,
}

impl BiographyRequest {
    const KEY_PREFIX: &'static str = "biography";
    const KEY_DELIMITER: char = ':';

    pub fn new(
        subject_name: impl AsRef<str>,
        language: impl AsRef<str>,
        detail_level: DetailLevel,
    ) -> Self {
        let subject_name = subject_name
            .as_ref()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            subject_name,
            language: language.as_ref().trim().to_ascii_lowercase(),
            detail_level,
        }
    }

    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn detail_level(&self) -> DetailLevel {
        self.detail_level
    }

    /// Stable cache key, e.g. `biography:Su Shi:zh:medium`.
    pub fn cache_key(&self) -> String {
        let d = Self::KEY_DELIMITER;
        format!(
            "{}{d}{}{d}{}{d}{}",
            Self::KEY_PREFIX,
            self.subject_name,
            self.language,
            self.detail_level
        )
    }
}

// ============================================================================
// EXTRACTION STRATEGY
// ============================================================================

/// Which extraction strategy the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    /// One trajectory call, then one coordinate call per distinct place.
    SerialPerPlace,
    /// Trajectory and coordinates in a single call.
    SingleShot,
    /// Paragraph chunks extracted concurrently and merged.
    #[default]
    ConcurrentChunked,
    /// Overlapping chunks mapped concurrently, then reduced by one call.
    SemanticMapReduce,
}

impl ExtractionStrategy {
    pub const ALL: [ExtractionStrategy; 4] = [
        Self::SerialPerPlace,
        Self::SingleShot,
        Self::ConcurrentChunked,
        Self::SemanticMapReduce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SerialPerPlace => "serial-per-place",
            Self::SingleShot => "single-shot",
            Self::ConcurrentChunked => "concurrent-chunked",
            Self::SemanticMapReduce => "semantic-map-reduce",
        }
    }

    /// Legacy numeric parse modes, 1 through 4.
    pub fn from_mode(mode: u8) -> Option<Self> {
        match mode {
            1 => Some(Self::SerialPerPlace),
            2 => Some(Self::SingleShot),
            3 => Some(Self::ConcurrentChunked),
            4 => Some(Self::SemanticMapReduce),
            _ => None,
        }
    }
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionStrategy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        if let Ok(mode) = normalized.parse::<u8>() {
            if let Some(strategy) = Self::from_mode(mode) {
                return Ok(strategy);
            }
        }
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| ParseEnumError {
                kind: "extraction strategy",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
