//! Core data types used throughout the analyst.
//!
//! This module defines the conversation messages, the tool descriptors
//! reported by the tool server, the translated function declarations sent
//! to the model, and the request/response formats that flow between the
//! conversation engine and the chat-completion transport.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

// --- Message Roles ---

/// The role of a message in the conversation.
///
/// - `System`: instructions to the model (invisible to the user)
/// - `User`: the analyst's query
/// - `Assistant`: the model's reply, possibly carrying tool calls
/// - `Tool`: the result of one tool call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

// --- Tool Call ---

/// A tool call request emitted by the model inside an assistant message.
///
/// The `id` is echoed back on the matching tool result so the model can
/// pair each result with its request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to invoke (e.g. "get_network_summary")
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them
    pub arguments: String,
}

/// The outcome of one tool call, ready to be folded back into the
/// conversation as a `tool` message. The content is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub content: String,
}

impl ToolCallResult {
    pub fn new(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }
}

// --- Tool Descriptors (registry-native form) ---

/// A tool as the tool server describes it.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub input_schema: Option<ToolSchema>,
}

/// Object schema describing a tool's parameters.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ToolSchema {
    #[serde(default, rename = "type", deserialize_with = "type_name")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Schema of a single parameter.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PropertySchema {
    /// First non-null entry when the schema lists several types.
    #[serde(default, rename = "type", deserialize_with = "type_name")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-encoded default value, kept raw until translation.
    #[serde(default, deserialize_with = "raw_json_text")]
    pub default: Option<String>,
    #[serde(default, rename = "enum")]
    pub enum_values: Vec<serde_json::Value>,
    #[serde(default)]
    pub items: Option<Box<PropertySchema>>,
}

fn raw_json_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.map(|v| v.to_string()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `"integer"` as well as `["integer", "null"]`.
fn type_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(name)) => Some(name),
        Some(serde_json::Value::Array(names)) => names.into_iter().find_map(|name| match name {
            serde_json::Value::String(name) if name != "null" => Some(name),
            _ => None,
        }),
        _ => None,
    })
}

// --- Function Declarations (chat-completion form) ---

/// A tool translated into the function-calling format of the
/// chat-completion API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the function's parameters
    pub parameters: serde_json::Value,
}

// --- Messages ---

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Non-empty when the assistant asks for tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool result messages, the id of the call being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a system message (sets the model's behavior/instructions).
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    /// Create a plain assistant reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

impl From<ToolCallResult> for Message {
    fn from(result: ToolCallResult) -> Self {
        Message::tool_result(result.tool_call_id, result.content)
    }
}

// --- Chat Request / Response ---

/// How the model may pick tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    /// The model decides whether and which tools to call.
    Auto,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
        }
    }
}

/// A request to send to the chat-completion transport.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// The full tool catalog, shared read-only across requests
    pub tools: Arc<[FunctionDeclaration]>,
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
}

/// The assistant turn returned by one completion call.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    /// Returns true if the model wants to call tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Text content, if the model returned any (possibly empty).
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref()
    }
}
