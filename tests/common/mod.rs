//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use toolchat::config::{Config, SandboxSettings};
use toolchat::providers::{LlmMessage, LlmProvider, LlmResponse, LlmToolCall, ModelInfo, ProviderError};

/// Sandbox settings that run evaluations through the built `toolchat` binary
pub fn sandbox_settings() -> SandboxSettings {
    SandboxSettings {
        executable: Some(PathBuf::from(env!("CARGO_BIN_EXE_toolchat"))),
        ..SandboxSettings::default()
    }
}

/// Default config wired to the built sandbox binary
pub fn test_config() -> Config {
    Config {
        sandbox: sandbox_settings(),
        ..Config::default()
    }
}

/// Replays queued responses and records every transcript it is sent
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<LlmResponse, ProviderError>>>,
    calls: Mutex<Vec<Vec<LlmMessage>>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `chat` call waits for `gate` to be notified before answering
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.push(Ok(LlmResponse::new(text)))
    }

    pub fn call_tools(self, calls: Vec<LlmToolCall>) -> Self {
        self.push(Ok(LlmResponse::new("").with_tool_calls(calls)))
    }

    pub fn fail(self, error: ProviderError) -> Self {
        self.push(Err(error))
    }

    fn push(self, response: Result<LlmResponse, ProviderError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn transcript_of_call(&self, index: usize) -> Vec<LlmMessage> {
        self.calls.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(
        &self,
        messages: Vec<LlmMessage>,
        _tools: Vec<Value>,
        _model: &str,
    ) -> Result<LlmResponse, ProviderError> {
        self.calls.lock().unwrap().push(messages);

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::unknown("script exhausted")))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(vec![ModelInfo::new("gpt-4.1-mini", false)])
    }

    fn default_model(&self) -> String {
        "gpt-4.1-mini".to_string()
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub fn tool_call(id: &str, name: &str, arguments: Value) -> LlmToolCall {
    LlmToolCall::new(id, name, arguments.to_string())
}

/// Checks that every tool message answers a call from the closest preceding
/// assistant message, and that all calls are answered in order
pub fn assert_tool_pairing(transcript: &[LlmMessage]) {
    let mut i = 0;
    while i < transcript.len() {
        let message = &transcript[i];
        assert!(!message.is_tool(), "tool message without assistant at {}", i);

        if let Some(calls) = message.tool_calls.as_ref().filter(|c| !c.is_empty()) {
            for (offset, call) in calls.iter().enumerate() {
                let result = transcript
                    .get(i + 1 + offset)
                    .unwrap_or_else(|| panic!("missing result for {}", call.id));
                assert!(result.is_tool());
                assert_eq!(result.tool_call_id.as_deref(), Some(call.id.as_str()));
            }
            i += calls.len();
        }
        i += 1;
    }
}
