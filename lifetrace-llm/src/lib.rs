//! LifeTrace LLM - Language Model Providers
//!
//! Concrete [`LanguageModel`](lifetrace_core::LanguageModel) implementations
//! plus the pieces every provider shares: bounded retry with backoff and the
//! order-preserving concurrent fan-out used by the chunked extraction
//! strategies.

pub mod dispatch;
pub mod providers;
pub mod retry;

pub use dispatch::invoke_many;
pub use providers::{OpenAIChatModel, OpenAIClient};
pub use retry::with_retry;
