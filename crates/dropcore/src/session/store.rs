//! Per-user session storage.
//!
//! One slot per user, each behind its own async mutex: events for one user are
//! serialized (FIFO, in arrival order) while different users proceed fully in
//! parallel. Idle sessions expire after a configurable TTL.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::types::{Category, Quality, UserId};
use crate::job::JobId;

/// Where the user is in the menu flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStage {
    AwaitingSource,
    AwaitingCategory,
    AwaitingDeliveryMode,
    Executing,
    Delivered,
    Failed,
}

/// The job currently running for a session.
#[derive(Debug, Clone)]
pub struct ActiveJob {
    pub id: JobId,
    pub cancel: CancellationToken,
}

/// Conversation state of one user.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub source_ref: Option<String>,
    pub selected_category: Option<Category>,
    pub selected_quality: Option<Quality>,
    pub stage: SessionStage,
    pub active_job: Option<ActiveJob>,
    last_active: Instant,
}

impl Session {
    pub fn new(user_id: UserId, source_ref: String) -> Self {
        Self {
            user_id,
            source_ref: Some(source_ref),
            selected_category: None,
            selected_quality: None,
            stage: SessionStage::AwaitingCategory,
            active_job: None,
            last_active: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    pub fn is_executing(&self) -> bool {
        self.stage == SessionStage::Executing
    }

    /// Back to the category menu, keeping the source reference.
    pub fn reset_to_category(&mut self) {
        self.stage = SessionStage::AwaitingCategory;
        self.selected_category = None;
        self.selected_quality = None;
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        !self.is_executing() && self.idle_for() >= ttl
    }
}

type Slot = Arc<Mutex<Option<Session>>>;

/// Exclusive access to one user's session for the duration of a transition.
pub type SessionGuard = OwnedMutexGuard<Option<Session>>;

/// Process-wide in-memory session storage. Nothing is persisted.
pub struct SessionStore {
    slots: DashMap<UserId, Slot>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            idle_ttl,
        }
    }

    fn slot(&self, user_id: UserId) -> Slot {
        // Clone the Arc out so no map shard lock is held across an await.
        Arc::clone(self.slots.entry(user_id).or_default().value())
    }

    /// Locks the user's slot. An idle session past its TTL is dropped first,
    /// so callers see it as absent.
    pub async fn lock(&self, user_id: UserId) -> SessionGuard {
        let mut guard = self.slot(user_id).lock_owned().await;
        if guard.as_ref().is_some_and(|s| s.is_expired(self.idle_ttl)) {
            log::info!("Session of user {} expired after inactivity", user_id);
            *guard = None;
        }
        guard
    }

    /// Current stage; a missing session reads as `AwaitingSource`.
    pub async fn stage(&self, user_id: UserId) -> SessionStage {
        self.lock(user_id)
            .await
            .as_ref()
            .map(|s| s.stage)
            .unwrap_or(SessionStage::AwaitingSource)
    }

    /// Copy of the session for inspection.
    pub async fn snapshot(&self, user_id: UserId) -> Option<Session> {
        self.lock(user_id).await.clone()
    }

    /// Removes idle sessions. Slots that are locked or referenced by an
    /// in-flight event are left alone. Returns how many were removed.
    pub fn purge_idle(&self) -> usize {
        let before = self.slots.len();
        let ttl = self.idle_ttl;
        // `retain` holds the shard write lock, so no one can clone a slot meanwhile.
        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(session) => session.as_ref().is_some_and(|s| !s.is_expired(ttl)),
                Err(_) => true,
            }
        });
        let removed = before.saturating_sub(self.slots.len());
        if removed > 0 {
            log::info!("Purged {} idle session slot(s)", removed);
        }
        removed
    }

    /// Releases a session whose job was dropped before recording an outcome.
    ///
    /// Only acts while `job_id` is still the registered job; returns whether it did.
    pub async fn abandon_job(&self, user_id: UserId, job_id: JobId) -> bool {
        let mut guard = self.lock(user_id).await;
        let Some(session) = guard.as_mut() else {
            return false;
        };
        if !session.active_job.as_ref().is_some_and(|job| job.id == job_id) {
            return false;
        }
        if let Some(job) = session.active_job.take() {
            job.cancel.cancel();
        }
        session.stage = SessionStage::Failed;
        session.reset_to_category();
        session.touch();
        log::info!("User {}: abandoned job {} released, back to category menu", user_id, job_id);
        true
    }

    /// Cancels every running job and clears all sessions.
    pub async fn shutdown(&self) {
        let slots: Vec<(UserId, Slot)> = self
            .slots
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (user_id, slot) in slots {
            let mut guard = slot.lock().await;
            if let Some(job) = guard.as_ref().and_then(|s| s.active_job.as_ref()) {
                log::info!("Cancelling job {} of user {} on shutdown", job.id, user_id);
                job.cancel.cancel();
            }
            *guard = None;
        }
        self.slots.clear();
    }

    /// Number of slots currently held (sessions plus empty placeholders).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
