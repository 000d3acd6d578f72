//! Session state machine.
//!
//! Stage transitions run synchronously under the user's slot lock. A direct
//! download marks the session `Executing`, releases the lock and runs the job,
//! so further events for that user are answered with "busy" instead of queueing
//! behind the worker. Only the job that is still registered on the session may
//! write its outcome back.
//!
//! Front ends that must not wait for the download call [`Orchestrator::begin`]
//! inline (so events keep their arrival order) and hand the returned
//! [`PendingJob`] to [`Orchestrator::run`] on another task.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::config::OrchestratorConfig;
use crate::core::error::{DropResult, JobError};
use crate::core::types::{Category, DeliveryMode, Quality, UserId};
use crate::core::validation::SourceValidator;
use crate::delivery::{deliver, DeliveryOutcome, NotificationSink};
use crate::executor::JobExecutor;
use crate::job::{JobDescriptor, JobDescriptorBuilder, JobId};
use crate::session::prompt::{
    OutboundPrompt, CATEGORY_PROMPT, COMMAND_PROMPT, DELIVERY_PROMPT, INVALID_SOURCE, START_PROMPT,
};
use crate::session::store::{ActiveJob, Session, SessionStage, SessionStore};

const PROCESSING_TEXT: &str = "Processing your request...";
const SENDING_TEXT: &str = "Download successful. Sending files...";

/// Inbound user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SourceSubmitted(String),
    CategoryChosen(Category),
    /// Raw quality label, validated on arrival
    QualityChosen(String),
    DeliveryModeChosen(DeliveryMode),
    BackRequested,
    ResetRequested,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::SourceSubmitted(_) => "source_submitted",
            SessionEvent::CategoryChosen(_) => "category_chosen",
            SessionEvent::QualityChosen(_) => "quality_chosen",
            SessionEvent::DeliveryModeChosen(_) => "delivery_mode_chosen",
            SessionEvent::BackRequested => "back_requested",
            SessionEvent::ResetRequested => "reset_requested",
        }
    }
}

/// Result of a locked transition.
enum Step {
    Reply(OutboundPrompt),
    Run(JobDescriptor, CancellationToken),
}

/// Result of the locked part of an event.
pub enum Advance {
    Reply(OutboundPrompt),
    /// The session is now `Executing`; finish with [`Orchestrator::run`].
    Job(PendingJob),
}

/// A direct download registered on its session but not finished.
///
/// Dropping it (or the future running it) before completion cancels the job
/// and puts the session back on the category menu.
pub struct PendingJob {
    descriptor: JobDescriptor,
    cancel: CancellationToken,
    registration: JobRegistration,
}

impl PendingJob {
    pub fn id(&self) -> JobId {
        self.descriptor.id
    }

    pub fn user_id(&self) -> UserId {
        self.descriptor.user_id
    }
}

/// Releases the session's `Executing` stage unless the job settled normally.
struct JobRegistration {
    store: Arc<SessionStore>,
    user_id: UserId,
    job_id: JobId,
    cancel: CancellationToken,
    settled: bool,
}

impl Drop for JobRegistration {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.cancel.cancel();
        log::warn!("Job {} of user {} abandoned before completion", self.job_id, self.user_id);

        let store = Arc::clone(&self.store);
        let (user_id, job_id) = (self.user_id, self.job_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.abandon_job(user_id, job_id).await;
                });
            }
            Err(_) => log::error!("No runtime to release job {} of user {}", job_id, user_id),
        }
    }
}

/// Drives sessions through their stages and runs direct downloads.
pub struct Orchestrator {
    store: Arc<SessionStore>,
    builder: JobDescriptorBuilder,
    executor: JobExecutor,
    validator: Arc<dyn SourceValidator>,
    sink: Arc<dyn NotificationSink>,
}

impl Orchestrator {
    pub fn new(config: &OrchestratorConfig, validator: Arc<dyn SourceValidator>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            store: Arc::new(SessionStore::new(config.session_idle_ttl)),
            builder: JobDescriptorBuilder::new(config),
            executor: JobExecutor::new(config),
            validator,
            sink,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn builder(&self) -> &JobDescriptorBuilder {
        &self.builder
    }

    /// Current stage of the user's session (`AwaitingSource` when there is none).
    pub async fn stage_of(&self, user_id: UserId) -> SessionStage {
        self.store.stage(user_id).await
    }

    /// Applies one event and returns what to show next.
    ///
    /// Never fails: every error becomes a prompt. For a direct download this
    /// returns only after the job finished and its working directory is gone.
    pub async fn advance(&self, user_id: UserId, event: SessionEvent) -> OutboundPrompt {
        match self.begin(user_id, event).await {
            Advance::Reply(prompt) => prompt,
            Advance::Job(job) => self.run(job).await,
        }
    }

    /// Applies the state transition of one event under the slot lock.
    ///
    /// A direct download comes back as [`Advance::Job`] with the session already
    /// `Executing`; nothing has been spawned yet.
    pub async fn begin(&self, user_id: UserId, event: SessionEvent) -> Advance {
        let event_name = event.name();
        let step = {
            let mut slot = self.store.lock(user_id).await;
            let before = stage_of_slot(&slot);
            let step = match self.transition(user_id, &mut slot, event) {
                Ok(step) => step,
                Err(e) => {
                    log::warn!(
                        "User {}: {} rejected in stage {:?} ({}): {}",
                        user_id,
                        event_name,
                        before,
                        e.subcategory(),
                        e
                    );
                    Step::Reply(error_prompt(&e, slot.as_ref()))
                }
            };
            let after = stage_of_slot(&slot);
            if before != after {
                log::info!("User {}: {:?} -> {:?} on {}", user_id, before, after, event_name);
            }
            step
        };

        match step {
            Step::Reply(prompt) => Advance::Reply(prompt),
            Step::Run(descriptor, cancel) => Advance::Job(PendingJob {
                registration: JobRegistration {
                    store: Arc::clone(&self.store),
                    user_id,
                    job_id: descriptor.id,
                    cancel: cancel.clone(),
                    settled: false,
                },
                descriptor,
                cancel,
            }),
        }
    }

    /// Removes idle sessions; meant to be called periodically.
    pub fn purge_idle(&self) -> usize {
        self.store.purge_idle()
    }

    /// Cancels all running jobs and drops every session.
    pub async fn shutdown(&self) {
        log::info!("Shutting down orchestrator, {} session slot(s)", self.store.len());
        self.store.shutdown().await;
    }

    fn transition(&self, user_id: UserId, slot: &mut Option<Session>, event: SessionEvent) -> DropResult<Step> {
        if let SessionEvent::ResetRequested = event {
            if let Some(job) = slot.take().and_then(|s| s.active_job) {
                log::info!("User {}: cancelling job {} on reset", user_id, job.id);
                job.cancel.cancel();
            }
            return Ok(Step::Reply(OutboundPrompt::text(START_PROMPT)));
        }

        if slot.as_ref().is_some_and(Session::is_executing) {
            return Err(JobError::SessionBusy);
        }

        match event {
            SessionEvent::SourceSubmitted(raw) => {
                if !self.validator.is_valid_source(&raw) {
                    return Err(JobError::Validation(INVALID_SOURCE.to_string()));
                }
                *slot = Some(Session::new(user_id, raw.trim().to_string()));
                Ok(Step::Reply(OutboundPrompt::category_menu(CATEGORY_PROMPT)))
            }

            SessionEvent::CategoryChosen(category) => {
                let session = session_with_source(slot)?;
                expect_stage(session, SessionStage::AwaitingCategory)?;
                session.selected_category = Some(category);
                session.selected_quality = None;
                session.stage = SessionStage::AwaitingDeliveryMode;
                session.touch();
                Ok(Step::Reply(OutboundPrompt::delivery_menu(DELIVERY_PROMPT, category)))
            }

            SessionEvent::QualityChosen(raw) => {
                let session = session_with_source(slot)?;
                expect_stage(session, SessionStage::AwaitingDeliveryMode)?;
                if session.selected_category != Some(Category::Video) {
                    return Err(JobError::Validation(
                        "Quality can only be chosen for video downloads.".to_string(),
                    ));
                }
                let quality = Quality::parse(&raw)?;
                let text = format!("Quality set to {}. {}", quality, DELIVERY_PROMPT);
                session.selected_quality = Some(quality);
                session.touch();
                Ok(Step::Reply(OutboundPrompt::delivery_menu(text, Category::Video)))
            }

            SessionEvent::DeliveryModeChosen(mode) => {
                let session = session_with_source(slot)?;
                expect_stage(session, SessionStage::AwaitingDeliveryMode)?;
                let (Some(source), Some(category)) = (session.source_ref.clone(), session.selected_category) else {
                    return Err(stale_choice());
                };
                session.touch();

                match mode {
                    DeliveryMode::ObtainCommand => {
                        let command = self.builder.command_line(
                            user_id,
                            &source,
                            category,
                            session.selected_quality.as_ref(),
                        );
                        log::info!("User {}: issued {} command", user_id, category);
                        let mut prompt = OutboundPrompt::delivery_menu(COMMAND_PROMPT, category);
                        prompt.command = Some(command);
                        Ok(Step::Reply(prompt))
                    }
                    DeliveryMode::DirectDownload => {
                        if !category.allows_direct_download() {
                            return Err(JobError::Validation(
                                "Direct download is not available for full videos. Use the download command instead."
                                    .to_string(),
                            ));
                        }
                        let job_id = JobId::new();
                        let descriptor =
                            self.builder
                                .build(user_id, &source, category, session.selected_quality.as_ref(), job_id);
                        let cancel = CancellationToken::new();
                        session.stage = SessionStage::Executing;
                        session.active_job = Some(ActiveJob {
                            id: job_id,
                            cancel: cancel.clone(),
                        });
                        Ok(Step::Run(descriptor, cancel))
                    }
                }
            }

            SessionEvent::BackRequested => match slot.as_mut() {
                Some(session) if session.source_ref.is_some() => {
                    session.reset_to_category();
                    session.touch();
                    Ok(Step::Reply(OutboundPrompt::category_menu(CATEGORY_PROMPT)))
                }
                _ => Ok(Step::Reply(OutboundPrompt::text(START_PROMPT))),
            },

            SessionEvent::ResetRequested => Ok(Step::Reply(OutboundPrompt::text(START_PROMPT))),
        }
    }

    /// Runs a direct download outside the slot lock, then records the outcome.
    pub async fn run(&self, job: PendingJob) -> OutboundPrompt {
        let PendingJob {
            descriptor,
            cancel,
            mut registration,
        } = job;
        let user_id = descriptor.user_id;
        self.notify(user_id, PROCESSING_TEXT).await;

        let outcome: DropResult<String> = match self.executor.execute(&descriptor, &cancel).await {
            Ok(job) => {
                self.notify(user_id, SENDING_TEXT).await;
                let delivery = deliver(&job.result, self.sink.as_ref(), user_id, &cancel).await;
                job.release().await;
                summarize_delivery(delivery)
            }
            Err(e) => Err(e),
        };

        let mut slot = self.store.lock(user_id).await;
        registration.settled = true;
        let still_registered = slot
            .as_ref()
            .and_then(|s| s.active_job.as_ref())
            .is_some_and(|job| job.id == descriptor.id);

        if !still_registered {
            log::info!("User {}: job {} finished after its session was reset", user_id, descriptor.id);
            return OutboundPrompt::text(JobError::Cancelled.user_message());
        }

        let Some(session) = slot.as_mut() else {
            return OutboundPrompt::text(JobError::Cancelled.user_message());
        };
        session.active_job = None;
        session.touch();

        match outcome {
            Ok(summary) => {
                session.stage = SessionStage::Delivered;
                log::info!("User {}: job {} delivered", user_id, descriptor.id);
                session.reset_to_category();
                OutboundPrompt::category_menu(format!("{}\n\n{}", summary, CATEGORY_PROMPT))
            }
            Err(JobError::Cancelled) => {
                session.stage = SessionStage::Failed;
                session.reset_to_category();
                OutboundPrompt::text(JobError::Cancelled.user_message())
            }
            Err(e) => {
                session.stage = SessionStage::Failed;
                log::warn!(
                    "User {}: job {} failed ({}): {}",
                    user_id,
                    descriptor.id,
                    e.subcategory(),
                    e
                );
                session.reset_to_category();
                OutboundPrompt::category_menu(format!("{}\n\n{}", e.user_message(), CATEGORY_PROMPT))
            }
        }
    }

    async fn notify(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.sink.send_text(user_id, text).await {
            log::warn!("Failed to notify user {}: {}", user_id, e);
        }
    }
}

fn stage_of_slot(slot: &Option<Session>) -> SessionStage {
    slot.as_ref().map(|s| s.stage).unwrap_or(SessionStage::AwaitingSource)
}

fn session_with_source(slot: &mut Option<Session>) -> DropResult<&mut Session> {
    match slot.as_mut() {
        Some(session) if session.source_ref.is_some() => Ok(session),
        _ => Err(JobError::NoSession),
    }
}

fn expect_stage(session: &Session, stage: SessionStage) -> DropResult<()> {
    if session.stage == stage {
        Ok(())
    } else {
        Err(stale_choice())
    }
}

fn stale_choice() -> JobError {
    JobError::Validation("That option is not available right now.".to_string())
}

fn summarize_delivery(outcome: DeliveryOutcome) -> DropResult<String> {
    match outcome {
        DeliveryOutcome::Success { delivered } => Ok(format!("✅ Sent {} file(s).", delivered)),
        DeliveryOutcome::PartialFailure { delivered, .. } => {
            let reasons: Vec<String> = outcome.errors().iter().map(JobError::user_message).collect();
            Ok(format!(
                "⚠️ Sent {} file(s), some could not be delivered:\n{}",
                delivered,
                reasons.join("\n")
            ))
        }
        DeliveryOutcome::Cancelled { delivered } => {
            log::info!("Delivery cancelled after {} file(s)", delivered);
            Err(JobError::Cancelled)
        }
        DeliveryOutcome::WorkerAnomaly => Err(JobError::WorkerAnomaly("worker exited 0 without producing files".to_string())),
    }
}

/// Error text plus the menu of the stage the user is still in.
fn error_prompt(error: &JobError, session: Option<&Session>) -> OutboundPrompt {
    let text = error.user_message();
    match session {
        Some(s) if s.stage == SessionStage::AwaitingCategory => {
            OutboundPrompt::category_menu(format!("{}\n\n{}", text, CATEGORY_PROMPT))
        }
        Some(s) if s.stage == SessionStage::AwaitingDeliveryMode => match s.selected_category {
            Some(category) => OutboundPrompt::delivery_menu(text, category),
            None => OutboundPrompt::text(text),
        },
        _ => OutboundPrompt::text(text),
    }
}
