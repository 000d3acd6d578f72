//! Artifact delivery to the notification sink.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::{JobError, SinkError};
use crate::core::types::UserId;
use crate::executor::JobResult;
use crate::session::prompt::{MenuOption, OutboundPrompt};

/// Outbound transport collaborator.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_text(&self, recipient: UserId, text: &str) -> Result<(), SinkError>;

    async fn send_file(&self, recipient: UserId, path: &Path, caption: &str) -> Result<(), SinkError>;

    /// The user's choice comes back later as an inbound event.
    async fn present_menu(&self, recipient: UserId, prompt: &str, options: &[MenuOption]) -> Result<(), SinkError>;

    /// Shows an orchestrator prompt: a menu when options are attached, plain text otherwise.
    async fn send_prompt(&self, recipient: UserId, prompt: &OutboundPrompt) -> Result<(), SinkError> {
        if prompt.has_menu() {
            self.present_menu(recipient, &prompt.body(), &prompt.options).await
        } else {
            self.send_text(recipient, &prompt.body()).await
        }
    }
}

/// How delivery of one job's artifacts went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Every artifact was accepted by the sink
    Success { delivered: usize },
    /// At least one artifact was rejected; the others were still attempted
    PartialFailure {
        delivered: usize,
        failures: Vec<(PathBuf, SinkError)>,
    },
    /// The job was cancelled between two artifacts; the rest were not sent
    Cancelled { delivered: usize },
    /// Worker exited 0 but produced nothing
    WorkerAnomaly,
}

impl DeliveryOutcome {
    /// Per-artifact failures as `JobError::Delivery`, in delivery order.
    pub fn errors(&self) -> Vec<JobError> {
        match self {
            DeliveryOutcome::PartialFailure { failures, .. } => failures
                .iter()
                .map(|(path, err)| JobError::Delivery {
                    path: path.clone(),
                    reason: err.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Sends every produced artifact as its own message.
///
/// Artifacts are sent in the order given (the executor sorts them by path). A
/// rejected artifact does not stop the remaining ones; cancellation does.
pub async fn deliver(
    result: &JobResult,
    sink: &dyn NotificationSink,
    recipient: UserId,
    cancel: &CancellationToken,
) -> DeliveryOutcome {
    if result.produced_artifacts.is_empty() {
        log::warn!(
            "Worker anomaly for user {}: exit code {} but no artifacts (stderr: {})",
            recipient,
            result.exit_code,
            result.stderr_text
        );
        return DeliveryOutcome::WorkerAnomaly;
    }

    let mut delivered = 0;
    let mut failures = Vec::new();

    for artifact in &result.produced_artifacts {
        if cancel.is_cancelled() {
            log::info!(
                "Delivery to user {} cancelled, {} of {} file(s) sent",
                recipient,
                delivered,
                result.produced_artifacts.len()
            );
            return DeliveryOutcome::Cancelled { delivered };
        }
        let caption = format!("{} · {}", artifact.kind.caption(), artifact.file_name());
        match sink.send_file(recipient, &artifact.path, &caption).await {
            Ok(()) => {
                delivered += 1;
                log::info!("Delivered {} to user {}", artifact.path.display(), recipient);
            }
            Err(e) => {
                log::warn!(
                    "Failed to deliver {} to user {}: {}",
                    artifact.path.display(),
                    recipient,
                    e
                );
                failures.push((artifact.path.clone(), e));
            }
        }
    }

    if failures.is_empty() {
        DeliveryOutcome::Success { delivered }
    } else {
        DeliveryOutcome::PartialFailure { delivered, failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ArtifactKind;
    use crate::executor::Artifact;
    use std::sync::Mutex;

    /// Records file sends; fails the ones whose name is listed.
    #[derive(Default)]
    struct FlakySink {
        reject: Vec<&'static str>,
        attempts: Mutex<Vec<String>>,
        /// Cancelled right after the first file goes out
        cancel_after_first: Option<CancellationToken>,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn send_text(&self, _recipient: UserId, _text: &str) -> Result<(), SinkError> {
            Ok(())
        }

        async fn send_file(&self, _recipient: UserId, path: &Path, _caption: &str) -> Result<(), SinkError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.attempts.lock().unwrap().push(name.clone());
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            if self.reject.contains(&name.as_str()) {
                return Err(SinkError::TooLarge { size: 100, limit: 10 });
            }
            Ok(())
        }

        async fn present_menu(&self, _recipient: UserId, _prompt: &str, _options: &[MenuOption]) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn result_with(names: &[&str]) -> JobResult {
        JobResult {
            exit_code: 0,
            produced_artifacts: names
                .iter()
                .map(|n| Artifact::from_path(PathBuf::from("/work").join(n)))
                .collect(),
            stderr_text: String::new(),
        }
    }

    #[tokio::test]
    async fn test_middle_failure_keeps_going() {
        let sink = FlakySink {
            reject: vec!["2.webp"],
            ..Default::default()
        };
        let outcome = deliver(&result_with(&["1.mp4", "2.webp", "3.vtt"]), &sink, UserId(1), &CancellationToken::new()).await;

        assert_eq!(*sink.attempts.lock().unwrap(), vec!["1.mp4", "2.webp", "3.vtt"]);
        match &outcome {
            DeliveryOutcome::PartialFailure { delivered, failures } => {
                assert_eq!(*delivered, 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].0, PathBuf::from("/work/2.webp"));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        let errors = outcome.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].user_message().contains("2.webp"));
    }

    #[tokio::test]
    async fn test_all_delivered_is_success() {
        let sink = FlakySink::default();
        let outcome = deliver(&result_with(&["a.m4a"]), &sink, UserId(1), &CancellationToken::new()).await;
        assert_eq!(outcome, DeliveryOutcome::Success { delivered: 1 });
        assert!(outcome.errors().is_empty());
    }

    #[tokio::test]
    async fn test_zero_artifacts_is_anomaly() {
        let sink = FlakySink::default();
        let outcome = deliver(&result_with(&[]), &sink, UserId(1), &CancellationToken::new()).await;
        assert_eq!(outcome, DeliveryOutcome::WorkerAnomaly);
        assert!(sink.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_stops_remaining_artifacts() {
        let cancel = CancellationToken::new();
        let sink = FlakySink {
            cancel_after_first: Some(cancel.clone()),
            ..Default::default()
        };
        let outcome = deliver(&result_with(&["1.mp4", "2.webp", "3.vtt"]), &sink, UserId(1), &cancel).await;

        assert_eq!(outcome, DeliveryOutcome::Cancelled { delivered: 1 });
        assert_eq!(*sink.attempts.lock().unwrap(), vec!["1.mp4"]);
    }

    #[tokio::test]
    async fn test_already_cancelled_sends_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let sink = FlakySink::default();
        let outcome = deliver(&result_with(&["a.m4a"]), &sink, UserId(1), &cancel).await;

        assert_eq!(outcome, DeliveryOutcome::Cancelled { delivered: 0 });
        assert!(sink.attempts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_caption_kind() {
        let artifact = Artifact::from_path(PathBuf::from("/work/x.m4a"));
        assert_eq!(artifact.kind, ArtifactKind::Audio);
    }
}
