//! Errors that end a conversation turn.
//!
//! Tool failures never show up here: they are folded into tool result
//! messages by the function call manager. What remains are failures of the
//! completion call itself, responses that break the protocol, and caller
//! cancellation.

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::Cancelled;

#[derive(Debug, Error)]
pub enum AnalystError {
    /// The completion API could not be reached or reported an error.
    #[error("chat completion failed: {0}")]
    Transport(#[from] LlmError),

    /// The model answered with neither text nor tool calls.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The caller cancelled the turn.
    #[error("turn cancelled")]
    Cancelled,

    /// The configured tool-cycle limit was reached.
    #[error("stopped after {0} tool cycles without a final answer")]
    IterationLimit(u32),
}

impl From<Cancelled> for AnalystError {
    fn from(_: Cancelled) -> Self {
        AnalystError::Cancelled
    }
}
