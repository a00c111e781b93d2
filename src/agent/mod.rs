pub mod agent_loop;
pub mod events;
pub mod session;
pub mod tools;

pub use agent_loop::{AgentError, AgentLoop, SYSTEM_PROMPT, TurnOutcome};
pub use events::{AgentEvent, EventReceiver, EventSender, event_channel};
pub use session::{LoopState, Session};
