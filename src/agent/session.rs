use std::fmt;
use std::sync::Arc;

use crate::providers::{LlmMessage, LlmProvider};

/// Where the agent loop is within a user turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    /// Waiting on the LLM
    Requesting,
    /// Running the tool calls of the last reply
    Dispatching,
}

impl LoopState {
    pub fn is_idle(&self) -> bool {
        matches!(self, LoopState::Idle)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Idle => "idle",
            LoopState::Requesting => "requesting",
            LoopState::Dispatching => "dispatching",
        };
        f.write_str(name)
    }
}

/// Conversation state for one chat: provider, model, transcript and the
/// processing guard
pub struct Session {
    pub(crate) provider: Arc<dyn LlmProvider>,
    pub(crate) model: String,
    pub(crate) transcript: Vec<LlmMessage>,
    pub(crate) state: LoopState,
}

impl Session {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            transcript: Vec::new(),
            state: LoopState::Idle,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn transcript(&self) -> &[LlmMessage] {
        &self.transcript
    }

    /// Puts `system_prompt` first unless a system message is already there
    pub(crate) fn ensure_system_prompt(&mut self, system_prompt: &str) {
        let has_prompt = self.transcript.first().is_some_and(LlmMessage::is_system);
        if !has_prompt {
            self.transcript.insert(0, LlmMessage::system(system_prompt));
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.provider.provider_name())
            .field("model", &self.model)
            .field("messages", &self.transcript.len())
            .field("state", &self.state)
            .finish()
    }
}
