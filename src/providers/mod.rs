//! LLM provider module for toolchat
//!
//! This module defines the trait and wire-independent types for talking to an
//! OpenAI-compatible chat-completions endpoint.
//!
//! # Architecture
//!
//! - `LlmProvider` trait defines the interface the agent loop depends on
//! - `GenericOpenAiProvider` implements it over HTTP
//! - `MockLlmProvider` (tests only) replays scripted responses
//!
//! # Example
//!
//! ```rust,no_run
//! use toolchat::providers::{LlmMessage, LlmProvider};
//!
//! async fn example(provider: &dyn LlmProvider) {
//!     let messages = vec![
//!         LlmMessage::system("You are a helpful assistant"),
//!         LlmMessage::user("Hello!"),
//!     ];
//!
//!     let response = provider.chat(messages, vec![], "gpt-4.1-mini").await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
#[cfg(test)]
pub mod mock;
pub mod openai;

pub use error::ProviderError;
pub use openai::GenericOpenAiProvider;

/// Model families the chat front-end supports
pub const SUPPORTED_MODEL_PATTERNS: [&str; 2] = ["gpt-4.1", "gpt-5"];

/// Represents a message in the conversation transcript
///
/// Optional fields are omitted from the wire when `None`, so an assistant
/// message without text and a tool message without tool calls serialize the
/// way providers expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmMessage {
    /// Role of the message sender
    pub role: LlmRole,
    /// Text content of the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<LlmToolCall>>,
    /// Id of the tool call this message answers (tool role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    /// Creates a new message with the specified role and content
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(LlmRole::User, content)
    }

    /// Builds the assistant message recorded for a provider reply
    ///
    /// `content` is kept only when non-empty and `tool_calls` only when
    /// at least one call was requested.
    pub fn assistant(content: &str, tool_calls: &[LlmToolCall]) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: (!content.is_empty()).then(|| content.to_string()),
            tool_calls: (!tool_calls.is_empty()).then(|| tool_calls.to_vec()),
            tool_call_id: None,
        }
    }

    /// Creates a tool result message answering `tool_call_id`
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Returns the text content or an empty string
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Returns true if this message is from the system
    pub fn is_system(&self) -> bool {
        matches!(self.role, LlmRole::System)
    }

    /// Returns true if this message is from the user
    pub fn is_user(&self) -> bool {
        matches!(self.role, LlmRole::User)
    }

    /// Returns true if this message is from the assistant
    pub fn is_assistant(&self) -> bool {
        matches!(self.role, LlmRole::Assistant)
    }

    /// Returns true if this message is a tool result
    pub fn is_tool(&self) -> bool {
        matches!(self.role, LlmRole::Tool)
    }
}

/// Role of a message sender in the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
    /// Tool result
    Tool,
}

impl LlmRole {
    /// Returns the string representation of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmRole::System => "system",
            LlmRole::User => "user",
            LlmRole::Assistant => "assistant",
            LlmRole::Tool => "tool",
        }
    }
}

impl fmt::Display for LlmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a tool call requested by the LLM
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmToolCall {
    /// Opaque identifier for this tool call
    pub id: String,
    /// Name of the tool to execute
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl LlmToolCall {
    /// Creates a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Response from the LLM provider
///
/// `content` is empty and `tool_calls` is empty when the provider omitted
/// them. An empty `tool_calls` is the loop-termination signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LlmResponse {
    /// Text of the assistant's reply
    pub content: String,
    /// Tool calls requested by the assistant
    #[serde(default)]
    pub tool_calls: Vec<LlmToolCall>,
    /// Number of tokens in the prompt (if provided by provider)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    /// Number of tokens in the completion (if provided by provider)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

impl LlmResponse {
    /// Creates a new response with just content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Creates a new response with tool calls
    pub fn with_tool_calls(mut self, tool_calls: Vec<LlmToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Returns true if this response contains tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Returns the total token count, counting a missing side as zero
    pub fn total_tokens(&self) -> Option<u32> {
        match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
        }
    }
}

/// A model advertised by the provider's `/models` endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub deprecated: bool,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, deprecated: bool) -> Self {
        Self {
            id: id.into(),
            deprecated,
        }
    }

    /// Returns true if the model belongs to a supported family
    pub fn is_supported(&self) -> bool {
        is_supported_model(&self.id)
    }
}

/// Case-insensitive match against [`SUPPORTED_MODEL_PATTERNS`]
pub fn is_supported_model(id: &str) -> bool {
    let id = id.to_lowercase();
    SUPPORTED_MODEL_PATTERNS
        .iter()
        .any(|pattern| id.contains(pattern))
}

/// Keeps only models from supported families, preserving order
pub fn filter_supported_models(models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    models.into_iter().filter(ModelInfo::is_supported).collect()
}

/// Trait for LLM providers
///
/// All implementations must be Send + Sync so a provider can be shared with
/// the agent loop behind an `Arc`.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send the full transcript and tool catalog, returning the first choice
    ///
    /// # Arguments
    ///
    /// * `messages` - Conversation transcript
    /// * `tools` - Tool definitions in OpenAI function format
    /// * `model` - Model identifier to use for this request
    async fn chat(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<serde_json::Value>,
        model: &str,
    ) -> Result<LlmResponse, ProviderError>;

    /// Lists the models available from this provider
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;

    /// Returns the default model for this provider
    fn default_model(&self) -> String;

    /// Returns the provider name, used for logging
    fn provider_name(&self) -> &'static str;
}
