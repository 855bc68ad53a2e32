//! LLM Client module.
//!
//! This module defines the `ChatTransport` trait that abstracts over the
//! chat-completion API, and the OpenAI-compatible implementation used by
//! the binary. The conversation engine only ever talks to the trait, so
//! tests can drive it with scripted responses.

pub mod error;
pub mod openai;

use async_trait::async_trait;

use crate::types::{ChatRequest, ChatResponse};

pub use error::LlmError;

/// Trait that chat-completion backends implement.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    ///
    /// Transport failures, non-success statuses and error payloads in
    /// the body are all reported as `Err`.
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Return the transport's display name (for logging).
    fn name(&self) -> &str;
}
