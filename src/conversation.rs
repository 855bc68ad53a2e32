//! Conversation engine - the core of the analyst.
//!
//! The engine owns the message history and drives the tool-calling loop
//! against the chat-completion API:
//!
//! ```text
//! User query
//!     |
//!     v
//! +--------+     +--------------+     +-------+
//! | Model  |<--->| Conversation |<--->| Tools |
//! +--------+     +--------------+     +-------+
//!     |                 |
//!     v                 v
//! Final answer     Tool results
//! ```
//!
//! Each completion request carries the full history and the full tool
//! catalog with `tool_choice: auto`. The loop keeps going for as many
//! call/continue cycles as the model asks for, and returns once a reply
//! carries content and no tool calls.
//!
//! An assistant message with tool calls is only committed to history
//! together with all of its results, so a failed or cancelled turn never
//! leaves an unanswered tool call behind.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AnalystError;
use crate::llm::ChatTransport;
use crate::tools::FunctionCallManager;
use crate::types::{ChatRequest, ChatResponse, Message, ToolChoice};

/// Where the engine is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    AwaitingModel,
    AwaitingTools,
}

pub struct Conversation {
    transport: Arc<dyn ChatTransport>,
    functions: Arc<FunctionCallManager>,
    messages: Vec<Message>,
    model: String,
    max_tokens: Option<u32>,
    /// Optional cap on tool cycles per turn; `None` lets the model decide.
    max_iterations: Option<u32>,
    state: State,
}

impl Conversation {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        functions: Arc<FunctionCallManager>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            functions,
            messages: Vec::new(),
            model: model.into(),
            max_tokens: None,
            max_iterations: None,
            state: State::Idle,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<u32>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    pub fn functions(&self) -> &FunctionCallManager {
        &self.functions
    }

    /// Append a system message to the history.
    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.messages.push(Message::system(content));
    }

    /// Process one user message through the tool-calling loop.
    ///
    /// On error the user message and every fully completed tool cycle stay
    /// in history; nothing from the failed step is appended.
    pub async fn process_message(
        &mut self,
        user_input: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AnalystError> {
        self.messages.push(Message::user(user_input));
        let outcome = self.run_turn(cancel).await;
        self.state = State::Idle;
        outcome
    }

    async fn run_turn(&mut self, cancel: &CancellationToken) -> Result<String, AnalystError> {
        let mut cycles = 0u32;

        loop {
            self.state = State::AwaitingModel;
            let response = self.request_completion(cancel).await?;

            if !response.has_tool_calls() {
                // Present content ends the turn even when empty.
                let Some(text) = response.text().map(str::to_string) else {
                    return Err(AnalystError::Protocol(
                        "response carried neither content nor tool calls".to_string(),
                    ));
                };
                info!(cycles, "Conversation turn complete");
                self.messages.push(Message::assistant(text.clone()));
                return Ok(text);
            }

            if let Some(limit) = self.max_iterations {
                if cycles >= limit {
                    return Err(AnalystError::IterationLimit(limit));
                }
            }
            cycles += 1;

            self.state = State::AwaitingTools;
            debug!(
                cycle = cycles,
                tool_calls = response.tool_calls.len(),
                finish_reason = ?response.finish_reason,
                "Model requested tool calls"
            );
            let results = self.functions.execute_batch(&response.tool_calls, cancel).await?;

            self.messages.push(Message::assistant_with_tool_calls(
                response.content,
                response.tool_calls,
            ));
            self.messages.extend(results.into_iter().map(Message::from));
        }
    }

    async fn request_completion(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, AnalystError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.messages.clone(),
            tools: self.functions.catalog(),
            tool_choice: ToolChoice::Auto,
            max_tokens: self.max_tokens,
        };

        debug!(
            state = ?self.state,
            transport = self.transport.name(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Requesting completion"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalystError::Cancelled),
            response = self.transport.chat_completion(&request) => Ok(response?),
        }
    }

    /// The ordered message history.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Drop the whole history, system messages included.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.state = State::Idle;
    }
}
