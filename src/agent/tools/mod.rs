//! Tool registry and executors
//!
//! The registry is an ordered catalog: definitions are sent to the model in
//! registration order, and `dispatch` turns any tool call into exactly one
//! tool-result message.

pub mod javascript;
pub mod proxy;
pub mod search;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use javascript::JavaScriptTool;
pub use proxy::ProxyRequestTool;
pub use search::SearchTool;
pub use types::{Tool, ToolDefinition, ToolError, ToolResult, validate_args_against_schema};

use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::providers::{LlmMessage, LlmToolCall};

/// Registry for managing available tools
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates a new empty tool registry
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The standard catalog: `google_search`, `execute_javascript`,
    /// `ai_pipe_request`
    pub fn with_default_tools(config: &Config, credentials: Arc<dyn CredentialStore>) -> Self {
        let mut registry = Self::new();
        let defaults: [Box<dyn Tool>; 3] = [
            Box::new(SearchTool::new(credentials)),
            Box::new(JavaScriptTool::new(config.sandbox.clone())),
            Box::new(ProxyRequestTool::new(
                config.proxy_base_url.clone(),
                config.proxy_token.clone(),
            )),
        ];

        for tool in defaults {
            // Names are distinct constants
            let _ = registry.register(tool);
        }

        tracing::debug!(tool_count = registry.len(), "Default tools registered");
        registry
    }

    /// Registers a tool in the registry
    ///
    /// # Errors
    /// Returns an error if a tool with the same name is already registered
    pub fn register(&mut self, tool: Box<dyn Tool>) -> ToolResult<()> {
        let name = tool.name().to_string();

        if self.get(&name).is_some() {
            return Err(ToolError::invalid_arguments(
                &name,
                format!("Tool '{}' is already registered", name),
            ));
        }

        self.tools.push(tool);
        Ok(())
    }

    /// Retrieves a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_tool_definition()).collect()
    }

    /// Definitions in the wire form expected by the chat endpoint
    pub fn get_tool_definitions(&self) -> Vec<Value> {
        self.definitions().iter().map(ToolDefinition::to_value).collect()
    }

    /// Runs one tool call, returning its output or error
    pub async fn execute(&self, call: &LlmToolCall) -> ToolResult<String> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let args = parse_arguments(call)?;
        validate_args_against_schema(&args, &tool.parameters(), &call.name)?;

        tool.execute(args).await
    }

    /// Runs one tool call and wraps the outcome as a tool-result message.
    ///
    /// Never fails: errors become `"Error: <message>"` content.
    pub async fn dispatch(&self, call: &LlmToolCall) -> DispatchOutcome {
        let outcome = self.execute(call).await;

        match outcome {
            Ok(content) => {
                tracing::info!(tool = %call.name, call_id = %call.id, "Tool executed");
                DispatchOutcome {
                    message: LlmMessage::tool_result(&call.id, content),
                    is_error: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    kind = e.kind(),
                    error = %e,
                    "Tool failed"
                );
                DispatchOutcome {
                    message: LlmMessage::tool_result(&call.id, format!("Error: {}", e)),
                    is_error: true,
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool-result message for one call, and whether it carries an error
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub message: LlmMessage,
    pub is_error: bool,
}

/// Arguments must decode to a JSON object; an empty string counts as `{}`
fn parse_arguments(call: &LlmToolCall) -> ToolResult<HashMap<String, Value>> {
    if call.arguments.trim().is_empty() {
        return Ok(HashMap::new());
    }

    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(ToolError::invalid_arguments(
            &call.name,
            "arguments must be a JSON object",
        )),
        Err(e) => Err(ToolError::invalid_arguments(
            &call.name,
            format!("arguments are not valid JSON: {}", e),
        )),
    }
}
