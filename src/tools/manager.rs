//! Function call manager.
//!
//! Owns the translated tool catalog and brokers execution of the tool
//! calls the model asks for. Every failure (bad arguments, unknown tool,
//! executor error) is turned into the text of a tool result attached to
//! the right call id, so the model can see it and react within the same
//! turn. The only way out without a result is caller cancellation.

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::schema;
use super::{ToolExecutor, ToolRegistry};
use crate::types::{FunctionDeclaration, ToolCall, ToolCallResult};

/// The caller cancelled while a tool was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tool execution cancelled")]
pub struct Cancelled;

pub struct FunctionCallManager {
    executor: Arc<dyn ToolExecutor>,
    catalog: Arc<[FunctionDeclaration]>,
    parallel: bool,
}

impl FunctionCallManager {
    /// Build a manager around an already translated catalog.
    pub fn new(catalog: Vec<FunctionDeclaration>, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            executor,
            catalog: catalog.into(),
            parallel: false,
        }
    }

    /// Query the registry once and translate every tool it reports.
    ///
    /// If the registry cannot be reached the manager starts in degraded
    /// mode with an empty catalog; conversations still work, the model
    /// just has nothing to call.
    pub async fn discover(registry: &dyn ToolRegistry, executor: Arc<dyn ToolExecutor>) -> Self {
        let catalog = match registry.list_tools().await {
            Ok(tools) => {
                // BTreeMap iteration keeps the catalog sorted by name.
                let catalog: Vec<FunctionDeclaration> = tools.values().map(schema::translate).collect();
                debug!(tools = catalog.len(), "Discovered tool catalog");
                catalog
            }
            Err(e) => {
                warn!(error = %e, "Tool discovery failed, continuing in degraded mode without tools");
                Vec::new()
            }
        };
        Self::new(catalog, executor)
    }

    /// Run the calls of one batch concurrently instead of one after another.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The shared, read-only catalog sent with every completion request.
    pub fn catalog(&self) -> Arc<[FunctionDeclaration]> {
        Arc::clone(&self.catalog)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.catalog.iter().any(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Execute a single tool call.
    pub async fn execute(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(reason) => {
                warn!(tool = %call.name, call_id = %call.id, %reason, "Rejected tool arguments");
                return Ok(ToolCallResult::new(
                    &call.id,
                    format!("Error: invalid arguments for {}: {}", call.name, reason),
                ));
            }
        };

        if !self.has_function(&call.name) {
            warn!(tool = %call.name, call_id = %call.id, "Model requested an unknown tool");
            return Ok(ToolCallResult::new(
                &call.id,
                format!("Error: unknown tool '{}'", call.name),
            ));
        }

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            outcome = self.executor.execute(&call.name, arguments) => outcome,
        };

        let content = match outcome {
            Ok(output) => {
                let text = output.joined_text();
                if text.trim().is_empty() {
                    format!("{} returned no text output", call.name)
                } else {
                    text
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool execution failed");
                format!("Error executing {}: {}", call.name, e)
            }
        };

        Ok(ToolCallResult::new(&call.id, content))
    }

    /// Execute every call of one assistant turn.
    ///
    /// Returns exactly one result per call, in the order the calls were
    /// given, whatever happens to the individual calls.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolCallResult>, Cancelled> {
        if self.parallel {
            return join_all(calls.iter().map(|call| self.execute(call, cancel)))
                .await
                .into_iter()
                .collect();
        }

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, cancel).await?);
        }
        Ok(results)
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
