//! Language model collaborator interface.
//!
//! Provider implementations live in lifetrace-llm; this module only holds
//! the request type and the trait the pipeline is written against.

use crate::LifetraceResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One prompt sent to a language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Text-in, text-out language model.
///
/// Implementations own their own timeout and retry policy. A returned error
/// means the call failed after those were exhausted.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one prompt and return the raw completion text.
    async fn invoke(&self, request: &ModelRequest) -> LifetraceResult<String>;

    /// Identifier of the underlying model, for logs and metrics.
    fn model_id(&self) -> &str;
}
