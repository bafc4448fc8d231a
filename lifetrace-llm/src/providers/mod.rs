//! LLM provider implementations
//!
//! Each provider exposes a low-level HTTP client and a
//! [`LanguageModel`](lifetrace_core::LanguageModel) adapter on top of it.

pub mod openai;

pub use openai::{OpenAIChatModel, OpenAIClient};

use lifetrace_core::{LifetraceError, LlmError};

pub(crate) fn request_failed(
    provider: &str,
    status: i32,
    message: impl Into<String>,
) -> LifetraceError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
    .into()
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> LifetraceError {
    LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> LifetraceError {
    LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    }
    .into()
}

pub(crate) fn timed_out(provider: &str, timeout_ms: u64) -> LifetraceError {
    LlmError::Timeout {
        provider: provider.to_string(),
        timeout_ms,
    }
    .into()
}
