//! OpenAI-compatible chat-completion transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatTransport, LlmError};
use crate::types::{ChatRequest, ChatResponse, Role, ToolCall};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    api_key: String,
    api_base: String,
    client: reqwest::Client,
}

// --- API Request Types (OpenAI format) ---

#[derive(Serialize, Debug)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Serialize, Debug)]
struct ApiMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize, Debug)]
struct ApiTool<'a> {
    r#type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Serialize, Debug)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ApiToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

// --- API Response Types ---

#[derive(Deserialize, Debug)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

// --- Implementation ---

impl OpenAiProvider {
    pub fn new(api_key: String, api_base: Option<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        })
    }

    fn build_api_request<'a>(&self, request: &'a ChatRequest) -> ApiRequest<'a> {
        let messages = request
            .messages
            .iter()
            .map(|msg| ApiMessage {
                role: msg.role.as_str(),
                content: match msg.role {
                    Role::Assistant => msg.content.as_deref().filter(|c| !c.is_empty()),
                    _ => Some(msg.text()),
                },
                tool_calls: msg
                    .tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: function_type(),
                        function: ApiToolCallFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
                tool_call_id: msg.tool_call_id.as_deref(),
            })
            .collect();

        let tools: Vec<ApiTool> = request
            .tools
            .iter()
            .map(|f| ApiTool {
                r#type: "function",
                function: ApiFunction {
                    name: &f.name,
                    description: &f.description,
                    parameters: &f.parameters,
                },
            })
            .collect();

        // tool_choice is only valid alongside a non-empty tool list.
        let tool_choice = if tools.is_empty() {
            None
        } else {
            Some(request.tool_choice.as_str())
        };

        ApiRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            tools,
            tool_choice,
        }
    }

    fn parse_response(&self, body: &str) -> Result<ChatResponse, LlmError> {
        let api_response: ApiResponse =
            serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;

        if let Some(error) = api_response.error {
            return Err(LlmError::ErrorPayload {
                kind: error.kind.unwrap_or_else(|| "unknown".to_string()),
                message: error.message,
            });
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ChatResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Pull the human-readable message out of an error body, if it has one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[async_trait]
impl ChatTransport for OpenAiProvider {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let api_request = self.build_api_request(request);
        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));

        debug!(
            %url,
            model = %request.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        self.parse_response(&body)
    }

    fn name(&self) -> &str {
        "OpenAI-Compatible"
    }
}
