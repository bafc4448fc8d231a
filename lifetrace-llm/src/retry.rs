//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use lifetrace_core::{LifetraceError, LifetraceResult, LlmError, RetryConfig};

/// Run `attempt` until it succeeds, fails permanently, or retries run out.
///
/// Only transient LLM errors (timeouts, rate limits, 5xx, transport
/// failures) are retried. A provider-supplied retry-after hint stretches the
/// backoff but never beyond `max_backoff`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryConfig,
    operation: &str,
    mut attempt: F,
) -> LifetraceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LifetraceResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(LifetraceError::Llm(e)) if e.is_transient() && retries < policy.max_retries => {
                let delay = delay_for(policy, retries, &e);
                tracing::warn!(
                    operation,
                    attempt = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient model error, retrying"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn delay_for(policy: &RetryConfig, retries: u32, error: &LlmError) -> Duration {
    let backoff = policy.backoff_for(retries);
    match error {
        LlmError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            backoff
                .max(Duration::from_millis(*retry_after_ms as u64))
                .min(policy.max_backoff)
        }
        _ => backoff,
    }
}
