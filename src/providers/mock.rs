//! Mock LLM provider for testing
//!
//! Replays a script of responses (or errors) in order, then falls back to a
//! default reply. Every transcript it receives is recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::providers::{
    LlmMessage, LlmProvider, LlmResponse, LlmToolCall, ModelInfo, ProviderError,
};

/// Mock provider for testing
pub struct MockLlmProvider {
    /// Scripted replies, consumed front to back
    script: Arc<Mutex<VecDeque<Result<LlmResponse, ProviderError>>>>,
    /// Reply used once the script is exhausted
    fallback: Arc<Mutex<LlmResponse>>,
    /// Models returned by list_models()
    models: Vec<ModelInfo>,
    default_model: String,
    name: &'static str,
    /// Every transcript passed to chat(), in call order
    calls: Arc<Mutex<Vec<Vec<LlmMessage>>>>,
    /// Tool catalog seen on the last call
    last_tools: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl MockLlmProvider {
    /// Creates a new mock provider with default settings
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(LlmResponse::new("Mock response"))),
            models: vec![
                ModelInfo::new("gpt-4.1-mini", false),
                ModelInfo::new("gpt-4o", false),
                ModelInfo::new("gpt-5", false),
            ],
            default_model: "mock-model".to_string(),
            name: "MockProvider",
            calls: Arc::new(Mutex::new(Vec::new())),
            last_tools: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a plain text reply
    pub fn push_text(&self, content: impl Into<String>) {
        self.push(Ok(LlmResponse::new(content)));
    }

    /// Queues a reply requesting tool calls
    pub fn push_tool_calls(&self, content: impl Into<String>, tool_calls: Vec<LlmToolCall>) {
        self.push(Ok(LlmResponse::new(content).with_tool_calls(tool_calls)));
    }

    /// Queues an error
    pub fn push_error(&self, error: ProviderError) {
        self.push(Err(error));
    }

    fn push(&self, reply: Result<LlmResponse, ProviderError>) {
        self.script.lock().unwrap().push_back(reply);
    }

    /// Returns the number of times chat() was called
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns the last transcript passed to chat()
    pub fn last_messages(&self) -> Option<Vec<LlmMessage>> {
        self.calls.lock().unwrap().last().cloned()
    }

    /// Returns the tool catalog passed on the last call
    pub fn last_tools(&self) -> Vec<serde_json::Value> {
        self.last_tools.lock().unwrap().clone()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockLlmProvider {
    async fn chat(
        &self,
        messages: Vec<LlmMessage>,
        tools: Vec<serde_json::Value>,
        _model: &str,
    ) -> Result<LlmResponse, ProviderError> {
        self.calls.lock().unwrap().push(messages);
        *self.last_tools.lock().unwrap() = tools;

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(reply) => reply,
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(self.models.clone())
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_replays_script_in_order() {
        let mock = MockLlmProvider::new();
        mock.push_tool_calls("", vec![LlmToolCall::new("call_1", "t", "{}")]);
        mock.push_text("done");

        let first = mock.chat(vec![], vec![], "m").await.unwrap();
        assert!(first.has_tool_calls());

        let second = mock.chat(vec![], vec![], "m").await.unwrap();
        assert_eq!(second.content, "done");

        let third = mock.chat(vec![], vec![], "m").await.unwrap();
        assert_eq!(third.content, "Mock response");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_provider_error() {
        let mock = MockLlmProvider::new();
        mock.push_error(ProviderError::network("Connection failed"));

        let result = mock.chat(vec![LlmMessage::user("Hi")], vec![], "model").await;
        assert!(result.unwrap_err().to_string().contains("Network error"));
    }

    #[tokio::test]
    async fn test_mock_provider_tracks_messages() {
        let mock = MockLlmProvider::new();
        let messages = vec![LlmMessage::system("System prompt"), LlmMessage::user("User message")];
        mock.chat(messages, vec![], "model").await.unwrap();

        let last = mock.last_messages().unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].text(), "System prompt");
        assert_eq!(last[1].text(), "User message");
    }

    #[test]
    fn test_mock_implements_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MockLlmProvider>();
    }
}
