//! LLM error types.

use thiserror::Error;

/// Errors that can occur when making chat-completion calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// API returned a non-success status
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// API returned a success status but an error object in the body
    #[error("api error ({kind}): {message}")]
    ErrorPayload { kind: String, message: String },

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// Response decoded but carried no choices
    #[error("empty response: no choices returned")]
    EmptyResponse,
}
