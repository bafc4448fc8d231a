//! OpenAI chat model implementing [`LanguageModel`].

use std::time::Instant;

use async_trait::async_trait;
use lifetrace_core::{LanguageModel, LifetraceResult, LlmSettings, ModelRequest, RetryConfig};

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::invalid_response;
use crate::retry::with_retry;

/// Chat-completions model with retry.
#[derive(Debug, Clone)]
pub struct OpenAIChatModel {
    client: OpenAIClient,
    model: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
}

impl OpenAIChatModel {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        let defaults = LlmSettings::default();
        Self {
            client,
            model: model.into(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            retry: defaults.retry,
        }
    }

    /// Build the client and model from settings.
    ///
    /// Fails with `LlmError::ProviderNotConfigured` when no API key is set.
    pub fn from_settings(settings: &LlmSettings) -> LifetraceResult<Self> {
        let client = OpenAIClient::new(
            settings.api_key.clone().unwrap_or_default(),
            settings.base_url.clone(),
            settings.request_timeout,
            settings.max_concurrency,
        )?;
        Ok(Self {
            client,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            retry: settings.retry.clone(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(&self, request: &ModelRequest) -> CompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(request.prompt.clone()));

        CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn invoke(&self, request: &ModelRequest) -> LifetraceResult<String> {
        let body = self.build_request(request);
        let started = Instant::now();

        let response: CompletionResponse = with_retry(&self.retry, "chat/completions", || {
            self.client.request("chat/completions", &body)
        })
        .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response("openai", "No choices in response"))?;

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!(model = %self.model, "Completion truncated at max_tokens");
        }
        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            total_tokens = response.usage.as_ref().map(|u| u.total_tokens),
            "Chat completion finished"
        );

        choice
            .message
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| invalid_response("openai", "Empty completion content"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
