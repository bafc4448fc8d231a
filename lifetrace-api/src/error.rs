//! Error Types for LifeTrace API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Errors are serialized as JSON alongside `"success": false`.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use lifetrace_core::{FetchError, LifetraceError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each code maps to one HTTP status and is stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The article search returned nothing for the subject
    NoSearchResults,

    /// Wikipedia could not be reached or answered with an error
    WikipediaApiError,

    /// Every extraction attempt failed
    BiographyExtractionFailed,

    /// Waiting on another caller's computation took too long
    CoalescingTimeout,

    RateLimitExceeded,

    /// Request contains invalid input data
    InvalidInput,

    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::NoSearchResults => StatusCode::NOT_FOUND,
            ErrorCode::WikipediaApiError => StatusCode::BAD_GATEWAY,
            ErrorCode::BiographyExtractionFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::CoalescingTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::NoSearchResults => "No article found for this person",
            ErrorCode::WikipediaApiError => "Wikipedia request failed",
            ErrorCode::BiographyExtractionFailed => "Could not extract a life trajectory",
            ErrorCode::CoalescingTimeout => "Timed out waiting for an identical request",
            ErrorCode::RateLimitExceeded => "Too many requests, please retry later",
            ErrorCode::InvalidInput => "Invalid input",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured API error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,

    pub message: String,

    /// Optional additional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds until a retry may succeed. Sent as the `retry-after` header.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience Constructors
    // ========================================================================

    /// Invalid value for a named request field.
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message).with_details(json!({ "field": field }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn rate_limited(limit: u32, window: Duration, retry_after: Duration) -> Self {
        let mut error = Self::from_code(ErrorCode::RateLimitExceeded).with_details(json!({
            "limit": limit,
            "window": window.as_secs(),
            "retry_after": retry_after.as_secs(),
        }));
        error.retry_after = Some(retry_after);
        error
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorBody {
            success: false,
            error: &self,
        });
        let mut response = (status, body).into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<LifetraceError> for ApiError {
    fn from(err: LifetraceError) -> Self {
        tracing::error!(error = %err, "Request failed");
        match err {
            LifetraceError::Fetch(FetchError::NotFound { subject, language }) => {
                ApiError::new(
                    ErrorCode::NoSearchResults,
                    format!("No article found for '{}'", subject),
                )
                .with_details(json!({ "name": subject, "language": language }))
            }
            LifetraceError::Fetch(e @ FetchError::Upstream { .. }) => {
                ApiError::new(ErrorCode::WikipediaApiError, e.to_string())
            }
            LifetraceError::Extraction(e) => {
                ApiError::new(ErrorCode::BiographyExtractionFailed, e.to_string())
            }
            LifetraceError::Llm(e) => {
                ApiError::new(ErrorCode::BiographyExtractionFailed, e.to_string())
            }
            LifetraceError::CoalescingTimeout { waited_ms, .. } => {
                ApiError::from_code(ErrorCode::CoalescingTimeout)
                    .with_details(json!({ "waited_ms": waited_ms }))
            }
            LifetraceError::Cache(e) => ApiError::internal_error(e.to_string()),
            LifetraceError::Config(e) => ApiError::internal_error(e.to_string()),
            LifetraceError::TaskFailed { reason } => ApiError::internal_error(reason),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// TESTS
// ============================================================================
