use std::path::PathBuf;

use thiserror::Error;

use crate::core::worker_errors::{analyze_worker_error, primary_error_line, worker_error_hint};

/// Longest stderr excerpt shown to a user.
const MAX_REASON_CHARS: usize = 600;

/// Failures of the session/job pipeline.
///
/// Every variant is caught at the session state machine boundary and turned into a
/// user-facing prompt; none of them crash the process.
#[derive(Error, Debug)]
pub enum JobError {
    /// Bad user input (source reference, quality, stale menu choice)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Category code outside the enumerated set
    #[error("Unsupported category: {0}")]
    UnsupportedCategory(String),

    /// Working directory could not be created or read
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Worker exited non-zero, timed out, or could not be started
    #[error("Worker failed: {0}")]
    WorkerFailure(String),

    /// A single artifact could not be sent
    #[error("Delivery of {path} failed: {reason}")]
    Delivery { path: PathBuf, reason: String },

    /// Worker reported success but produced nothing
    #[error("Worker anomaly: {0}")]
    WorkerAnomaly(String),

    /// A job is already running for this user
    #[error("A job is already running for this session")]
    SessionBusy,

    /// The session was torn down while its job was running
    #[error("Job cancelled")]
    Cancelled,

    /// Event arrived without a session (or without a source reference)
    #[error("No active session")]
    NoSession,
}

/// Type alias for Result with JobError
pub type DropResult<T> = Result<T, JobError>;

impl JobError {
    /// Returns subcategory for logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::UnsupportedCategory(_) => "unsupported_category",
            JobError::Storage { .. } => "storage",
            JobError::WorkerFailure(_) => "worker_failure",
            JobError::Delivery { .. } => "delivery",
            JobError::WorkerAnomaly(_) => "worker_anomaly",
            JobError::SessionBusy => "session_busy",
            JobError::Cancelled => "cancelled",
            JobError::NoSession => "no_session",
        }
    }

    /// Short, specific reason suitable for the chat.
    pub fn user_message(&self) -> String {
        match self {
            JobError::Validation(reason) => format!("❌ {}", reason),
            // Programming/config error: fail closed without leaking internals.
            JobError::UnsupportedCategory(_) => "❌ Invalid option selected.".to_string(),
            JobError::Storage { .. } => "❌ Could not prepare storage for your download. Please try again.".to_string(),
            JobError::WorkerFailure(reason) => {
                let excerpt = truncate_reason(&primary_error_line(reason).unwrap_or_else(|| reason.to_string()));
                match worker_error_hint(&analyze_worker_error(reason)) {
                    Some(hint) => format!("❌ Download failed: {}\n\n{}", excerpt, hint),
                    None => format!("❌ Download failed: {}", excerpt),
                }
            }
            JobError::Delivery { path, reason } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                format!("❌ Could not send {}: {}", name, reason)
            }
            JobError::WorkerAnomaly(_) => "❌ The download finished but produced no files.".to_string(),
            JobError::SessionBusy => "⏳ Busy, please wait until the current download finishes.".to_string(),
            JobError::Cancelled => "🛑 Download cancelled.".to_string(),
            JobError::NoSession => "No valid link found. Please start again by sending a link.".to_string(),
        }
    }
}

/// Keeps the tail of long stderr output; the last lines carry the actual error.
fn truncate_reason(reason: &str) -> String {
    let trimmed = reason.trim();
    let count = trimmed.chars().count();
    if count <= MAX_REASON_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - MAX_REASON_CHARS).collect();
    format!("…{}", tail)
}

/// Failures reported by a notification sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// File exceeds what the transport accepts
    #[error("file too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    /// Transport-level failure (network, API error)
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_failure_message_contains_stderr() {
        let err = JobError::WorkerFailure("network error".to_string());
        assert!(err.user_message().contains("network error"));
        assert_eq!(err.subcategory(), "worker_failure");
    }

    #[test]
    fn test_unsupported_category_message_is_generic() {
        let err = JobError::UnsupportedCategory("podcast".to_string());
        assert!(!err.user_message().contains("podcast"));
    }

    #[test]
    fn test_long_stderr_keeps_tail() {
        let mut reason = "x".repeat(2000);
        reason.push_str("ERROR: final line");
        let message = JobError::WorkerFailure(reason).user_message();
        assert!(message.contains("ERROR: final line"));
        assert!(message.chars().count() < 900);
    }

    #[test]
    fn test_long_error_line_is_bounded() {
        let reason = format!("[download] 12%\nERROR: [youtube] abc123: {}\n", "y".repeat(5000));
        let message = JobError::WorkerFailure(reason).user_message();
        assert!(message.starts_with("❌ Download failed: …"));
        assert!(message.chars().count() < 900);
    }

    #[test]
    fn test_delivery_message_names_file() {
        let err = JobError::Delivery {
            path: PathBuf::from("/tmp/x/abc.mp4"),
            reason: "too big".to_string(),
        };
        assert_eq!(err.user_message(), "❌ Could not send abc.mp4: too big");
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::TooLarge { size: 10, limit: 5 };
        assert_eq!(err.to_string(), "file too large (10 bytes, limit 5 bytes)");
    }
}
