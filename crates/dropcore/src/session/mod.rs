//! Per-user conversation sessions and the state machine driving them.

pub mod machine;
pub mod prompt;
pub mod store;

pub use machine::{Advance, Orchestrator, PendingJob, SessionEvent};
pub use prompt::{MenuOption, OutboundPrompt};
pub use store::{Session, SessionStage, SessionStore};
