//! Core utilities, configuration, and common functionality

pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod types;
pub mod validation;
pub mod worker_errors;

// Re-exports for convenience
pub use config::OrchestratorConfig;
pub use error::{DropResult, JobError, SinkError};
pub use logging::{init_logger, log_worker_configuration};
pub use types::{ArtifactKind, Category, DeliveryMode, Quality, UserId};
