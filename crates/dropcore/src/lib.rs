//! Session-scoped job orchestration for a chat-driven media fetcher.
//!
//! A user submits a source link, picks a category and a delivery mode, and the
//! [`session::Orchestrator`] either returns the equivalent worker command line or
//! runs the worker in a per-job directory, delivers the produced files through a
//! [`delivery::NotificationSink`] and removes the directory afterwards.

pub mod core;
pub mod delivery;
pub mod executor;
pub mod job;
pub mod session;

pub use crate::core::{Category, DeliveryMode, DropResult, JobError, OrchestratorConfig, Quality, SinkError, UserId};
pub use delivery::{deliver, DeliveryOutcome, NotificationSink};
pub use executor::{Artifact, CompletedJob, JobExecutor, JobResult};
pub use job::{JobDescriptor, JobDescriptorBuilder, JobId};
pub use session::{Advance, MenuOption, Orchestrator, OutboundPrompt, PendingJob, SessionEvent, SessionStage};
