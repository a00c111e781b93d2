use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;

use crate::agent::events::{AgentEvent, EventSender};
use crate::agent::session::{LoopState, Session};
use crate::agent::tools::ToolRegistry;
use crate::providers::{LlmMessage, LlmProvider, LlmResponse, ProviderError};

/// Instruction message placed at the start of every transcript
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that can use tools. \
Use google_search for current information, execute_javascript for calculations \
and data processing, and ai_pipe_request to fetch web pages or APIs. \
Call tools when they improve accuracy, then answer concisely.";

/// Errors that end a user turn
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("A turn is already in progress")]
    Busy,
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// How a submitted message was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input, or a turn was already running
    Ignored,
    /// The model's final text
    Replied(String),
}

/// Drives LLM calls and tool dispatch over one session
pub struct AgentLoop {
    session: Mutex<Session>,
    tool_registry: Arc<ToolRegistry>,
    events: Option<EventSender>,
    system_prompt: String,
}

/// Returns the session to `Idle` when a turn ends, however it ends
struct TurnGuard<'a> {
    session: &'a Mutex<Session>,
}

impl TurnGuard<'_> {
    fn set_state(&self, state: LoopState) {
        lock(self.session).state = state;
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        lock(self.session).state = LoopState::Idle;
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AgentLoop {
    pub fn new(
        llm_provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        tool_registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            session: Mutex::new(Session::new(llm_provider, model)),
            tool_registry,
            events: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    /// Sends [`AgentEvent`]s to `events` during each turn
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn state(&self) -> LoopState {
        lock(&self.session).state()
    }

    pub fn model(&self) -> String {
        lock(&self.session).model().to_string()
    }

    /// Snapshot of the transcript
    pub fn transcript(&self) -> Vec<LlmMessage> {
        lock(&self.session).transcript().to_vec()
    }

    /// Replaces provider and model. Only allowed between turns.
    pub fn reconfigure(&self, llm_provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Result<()> {
        let mut session = lock(&self.session);
        if !session.state.is_idle() {
            return Err(AgentError::Busy);
        }

        session.provider = llm_provider;
        session.model = model.into();
        tracing::info!(
            provider = session.provider.provider_name(),
            model = %session.model,
            "Agent reconfigured"
        );
        Ok(())
    }

    /// Clears the transcript. Only allowed between turns.
    pub fn reset(&self) -> Result<()> {
        let mut session = lock(&self.session);
        if !session.state.is_idle() {
            return Err(AgentError::Busy);
        }

        session.transcript.clear();
        tracing::debug!("Transcript cleared");
        Ok(())
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is rendering
            let _ = events.send(event);
        }
    }

    /// Runs one user turn to completion.
    ///
    /// Repeats LLM call and tool dispatch until the model replies without
    /// tool calls. An LLM failure ends the turn with the transcript left as
    /// it was before the failed call.
    pub async fn submit(&self, input: &str) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        let (llm_provider, model) = {
            let mut session = lock(&self.session);
            if !session.state.is_idle() {
                tracing::debug!(state = %session.state, "Turn in progress, ignoring input");
                return Ok(TurnOutcome::Ignored);
            }

            session.state = LoopState::Requesting;
            session.ensure_system_prompt(&self.system_prompt);
            session.transcript.push(LlmMessage::user(input));
            (Arc::clone(&session.provider), session.model.clone())
        };

        let guard = TurnGuard {
            session: &self.session,
        };

        let tools = self.tool_registry.get_tool_definitions();
        let mut iteration: u32 = 0;

        loop {
            iteration += 1;
            guard.set_state(LoopState::Requesting);

            let context = self.transcript();
            tracing::debug!(
                iteration = iteration,
                messages = context.len(),
                model = %model,
                "Agent loop iteration"
            );

            let response: LlmResponse = match llm_provider.chat(context, tools.clone(), &model).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(iteration = iteration, error = %e, "LLM call failed");
                    self.emit(AgentEvent::Error {
                        message: e.to_string(),
                    });
                    return Err(AgentError::Provider(e));
                }
            };
            if let Some(tokens) = response.total_tokens() {
                tracing::debug!(iteration = iteration, tokens = tokens, "LLM usage");
            }

            let assistant = LlmMessage::assistant(&response.content, &response.tool_calls);

            if !response.has_tool_calls() {
                lock(&self.session).transcript.push(assistant);
                tracing::info!(iterations = iteration, "Agent loop complete with text response");
                self.emit(AgentEvent::Reply {
                    text: response.content.clone(),
                });
                return Ok(TurnOutcome::Replied(response.content));
            }

            guard.set_state(LoopState::Dispatching);
            tracing::info!(
                iteration = iteration,
                tool_count = response.tool_calls.len(),
                "LLM requested tool executions"
            );

            for call in &response.tool_calls {
                self.emit(AgentEvent::ToolStarted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                });
            }

            // join_all yields results in call order, not completion order
            let outcomes = join_all(
                response
                    .tool_calls
                    .iter()
                    .map(|call| self.tool_registry.dispatch(call)),
            )
            .await;

            for (call, outcome) in response.tool_calls.iter().zip(&outcomes) {
                self.emit(AgentEvent::ToolFinished {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    content: outcome.message.text().to_string(),
                    is_error: outcome.is_error,
                });
            }

            // Assistant message and its results land together so the
            // transcript never holds unanswered tool calls
            {
                let mut session = lock(&self.session);
                session.transcript.push(assistant);
                session
                    .transcript
                    .extend(outcomes.into_iter().map(|outcome| outcome.message));
            }
        }
    }
}
