//! Error types for LifeTrace operations

use thiserror::Error;

/// Article source errors.
///
/// Surfaced to the caller as a user-facing failure. The core never retries
/// these; any retrying happens inside the source itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("No article found for '{subject}' ({language})")]
    NotFound { subject: String, language: String },

    #[error("Article source {source_name} failed: {reason}")]
    Upstream { source_name: String, reason: String },
}

/// Extraction pipeline errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Article text is empty")]
    EmptyInput,

    #[error("All {chunk_count} chunk extractions failed")]
    AllChunksFailed { chunk_count: usize },

    #[error("Strategy {strategy} failed: {reason}")]
    Strategy { strategy: String, reason: String },
}

/// Cache backend errors.
///
/// Always absorbed inside the storage layer and logged. They degrade to a
/// miss or a no-op, except at startup where an explicitly requested backend
/// cannot be reached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Cache serialization error for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache backend {backend} error: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Cache backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl LlmError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } => true,
            Self::RequestFailed { status, .. } => *status == 0 || *status >= 500,
            Self::ProviderNotConfigured | Self::InvalidResponse { .. } => false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all LifeTrace errors.
#[derive(Debug, Clone, Error)]
pub enum LifetraceError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timed out after {waited_ms}ms waiting for in-flight computation of {key}")]
    CoalescingTimeout { key: String, waited_ms: u64 },

    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Result type alias for LifeTrace operations.
pub type LifetraceResult<T> = Result<T, LifetraceError>;

// =============================================================================
// TESTS
// =============================================================================
