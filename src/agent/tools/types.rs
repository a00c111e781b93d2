//! Types for the tool system
//!
//! This module defines the core types for the tool system including:
//! - Tool trait for implementing tools
//! - ToolError for error handling
//! - ToolDefinition for the LLM function format

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Checks that every field listed in the schema's `required` array is present
pub fn validate_args_against_schema(
    args: &HashMap<String, Value>,
    schema: &Value,
    tool_name: &str,
) -> ToolResult<()> {
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for field_name in required.iter().filter_map(Value::as_str) {
        match args.get(field_name) {
            Some(Value::Null) | None => {
                return Err(ToolError::InvalidArguments {
                    tool: tool_name.to_string(),
                    message: format!("Missing required parameter '{}'", field_name),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Error types for tool execution
///
/// The display text of each variant is what the model sees after the
/// `Error: ` prefix.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    /// A credential or setting the tool needs is absent
    #[error("{0}")]
    Configuration(String),

    /// Non-success HTTP status or transport failure
    #[error("{0}")]
    Network(String),

    /// Every JavaScript evaluation strategy failed
    #[error("JavaScript execution failed: {0}")]
    Evaluation(String),

    /// The model named a tool that is not registered
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Arguments were not a JSON object or a required field is missing
    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: &str, message: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }

    /// Short kind label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Configuration(_) => "configuration",
            ToolError::Network(_) => "network",
            ToolError::Evaluation(_) => "evaluation",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::InvalidArguments { .. } => "invalid_arguments",
        }
    }
}

/// Result type for tool operations
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Definition of a tool for LLM function calling
///
/// Serializes to the OpenAI function format,
/// `{ "type": "function", "function": { name, description, parameters } }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Always "function"
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn description(&self) -> &str {
        &self.function.description
    }

    pub fn parameters(&self) -> &Value {
        &self.function.parameters
    }

    /// Wire form sent in the `tools` array of a chat request
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": self.r#type,
            "function": {
                "name": self.function.name,
                "description": self.function.description,
                "parameters": self.function.parameters,
            }
        })
    }
}

/// Trait for implementing tools that the agent can use
///
/// Any type implementing this trait can be registered with the ToolRegistry
/// and offered to the model.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call the tool
    fn name(&self) -> &str;

    /// Description shown to the model
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters
    ///
    /// The schema must have `type: "object"` at the root, a `properties`
    /// object and a `required` array.
    fn parameters(&self) -> Value;

    /// Executes the tool with the given arguments
    ///
    /// # Returns
    /// * `Ok(String)` - JSON-encoded result handed back to the model
    /// * `Err(ToolError)` - If execution fails
    async fn execute(&self, args: HashMap<String, Value>) -> ToolResult<String>;

    fn to_tool_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "method": { "type": "string", "default": "GET" }
            },
            "required": ["url"]
        })
    }

    #[test]
    fn test_validate_args_present() {
        let mut args = HashMap::new();
        args.insert("url".to_string(), json!("https://example.com"));
        assert!(validate_args_against_schema(&args, &schema(), "t").is_ok());
    }

    #[test]
    fn test_validate_args_missing_or_null() {
        let args = HashMap::new();
        let err = validate_args_against_schema(&args, &schema(), "t").unwrap_err();
        assert!(err.to_string().contains("Missing required parameter 'url'"));

        let mut args = HashMap::new();
        args.insert("url".to_string(), Value::Null);
        assert!(validate_args_against_schema(&args, &schema(), "t").is_err());
    }

    #[test]
    fn test_error_display_is_model_facing() {
        let err = ToolError::Configuration("Google Search not configured".to_string());
        assert_eq!(err.to_string(), "Google Search not configured");

        let err = ToolError::UnknownTool("fly".to_string());
        assert_eq!(err.to_string(), "Unknown tool: fly");
        assert_eq!(err.kind(), "unknown_tool");

        let err = ToolError::Evaluation("Unexpected token".to_string());
        assert_eq!(err.to_string(), "JavaScript execution failed: Unexpected token");
    }

    #[test]
    fn test_tool_definition_wire_format() {
        let def = ToolDefinition::new("fetch", "Fetch a URL", schema());

        assert_eq!(def.r#type, "function");
        assert_eq!(def.name(), "fetch");
        assert_eq!(def.description(), "Fetch a URL");

        let wire = def.to_value();
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "fetch");
        assert_eq!(wire["function"]["parameters"]["required"][0], "url");
        assert_eq!(serde_json::to_value(&def).unwrap(), wire);
    }
}
