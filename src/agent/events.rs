/// Notifications emitted by the agent loop for the user interface
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A tool call is about to run
    ToolStarted { id: String, name: String },
    /// A tool call finished; `content` is exactly what the model receives
    ToolFinished {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    /// Final assistant text for the turn
    Reply { text: String },
    /// The turn ended on an LLM failure
    Error { message: String },
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Reply { .. } | AgentEvent::Error { .. })
    }
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<AgentEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AgentEvent>;

/// Creates a channel for loop events
pub fn event_channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
