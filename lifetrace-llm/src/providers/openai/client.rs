//! OpenAI HTTP client with a concurrency cap and per-request timeout

use super::types::ApiError;
use crate::providers::{invalid_response, rate_limited, request_failed, timed_out};
use lifetrace_core::{LifetraceResult, LlmError};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const PROVIDER: &str = "openai";

/// OpenAI API client.
///
/// Single attempt per call; retrying is layered on top by the caller. At
/// most `max_concurrency` requests are in flight at once, so a large chunk
/// fan-out queues here instead of tripping provider rate limits.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl OpenAIClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_key` - API key sent as a bearer token
    /// * `base_url` - e.g. `https://api.openai.com/v1`
    /// * `request_timeout` - bound on one HTTP round trip
    /// * `max_concurrency` - in-flight request cap (minimum 1)
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        request_timeout: Duration,
        max_concurrency: usize,
    ) -> LifetraceResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::ProviderNotConfigured.into());
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| request_failed(PROVIDER, 0, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `endpoint` and decode the JSON response.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> LifetraceResult<Res> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("Concurrency limiter closed: {}", e)))?;

        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            response.json().await.map_err(|e| {
                if e.is_timeout() {
                    timed_out(PROVIDER, self.timeout_ms())
                } else {
                    invalid_response(PROVIDER, format!("Failed to parse response: {}", e))
                }
            })
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(api_error) => api_error.error.message,
                Err(_) => error_text,
            };

            Err(match status {
                StatusCode::TOO_MANY_REQUESTS => rate_limited(PROVIDER, retry_after_ms),
                _ => request_failed(PROVIDER, status.as_u16() as i32, error_msg),
            })
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> lifetrace_core::LifetraceError {
        if e.is_timeout() {
            timed_out(PROVIDER, self.timeout_ms())
        } else {
            request_failed(PROVIDER, 0, format!("HTTP request failed: {}", e))
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.request_timeout.as_millis() as u64
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|seconds| (seconds * 1000.0) as i64)
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifetrace_core::LifetraceError;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_debug_redacts_api_key() -> Result<(), String> {
        let client = OpenAIClient::new("sk-secret", "https://example.invalid/v1/", Duration::from_secs(1), 2)
            .map_err(|e| e.to_string())?;
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(client.base_url(), "https://example.invalid/v1");
        Ok(())
    }

    #[test]
    fn test_empty_api_key_is_not_configured() {
        let result = OpenAIClient::new("  ", "https://example.invalid", Duration::from_secs(1), 1);
        assert!(matches!(
            result,
            Err(LifetraceError::Llm(LlmError::ProviderNotConfigured))
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_ms(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("1.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(1500));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient_failure() -> Result<(), String> {
        let client = OpenAIClient::new("sk-test", "http://127.0.0.1:1", Duration::from_secs(2), 1)
            .map_err(|e| e.to_string())?;
        let result: LifetraceResult<serde_json::Value> =
            client.request("chat/completions", &serde_json::json!({})).await;
        match result {
            Err(LifetraceError::Llm(e)) => assert!(e.is_transient()),
            other => return Err(format!("expected transport error, got {:?}", other)),
        }
        Ok(())
    }
}
