//! Tool System module.
//!
//! This module defines the two capabilities the analyst needs from a tool
//! server, and the pieces that sit between them and the model:
//!
//! - **ToolRegistry**: lists the tools the server offers, with their schemas
//! - **ToolExecutor**: runs one tool with JSON arguments
//! - **schema**: turns registry schemas into function declarations
//! - **FunctionCallManager**: holds the translated catalog and turns every
//!   tool call, successful or not, into a tool result message
//! - **McpClient**: the JSON-RPC client for the telemetry tool server

pub mod manager;
pub mod mcp;
pub mod schema;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::ToolDescriptor;

pub use manager::{Cancelled, FunctionCallManager};

/// Errors reported by a tool server.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool server could not be reached.
    #[error("tool server unavailable: {0}")]
    Unavailable(String),

    /// The server answered with a JSON-RPC error object.
    #[error("tool server error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The tool ran but reported a failure.
    #[error("{0}")]
    Execution(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// One piece of content returned by a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    /// Non-text content (images, resources); not forwarded to the model.
    Other(String),
}

/// Everything a tool returned for one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub content: Vec<ToolContent>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text(text.into())],
        }
    }

    /// All text fragments, newline separated.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text(text) => Some(text.as_str()),
                ToolContent::Other(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Source of tool descriptors.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// List every tool the server knows, keyed by name.
    async fn list_tools(&self) -> Result<BTreeMap<String, ToolDescriptor>, ToolError>;
}

/// Runs tools on behalf of the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with already-parsed arguments.
    async fn execute(&self, name: &str, arguments: Map<String, Value>)
        -> Result<ToolOutput, ToolError>;
}
