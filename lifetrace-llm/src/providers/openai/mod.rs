//! OpenAI-compatible chat completions provider.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol.

pub mod chat;
pub mod client;
pub mod types;

pub use chat::OpenAIChatModel;
pub use client::OpenAIClient;
