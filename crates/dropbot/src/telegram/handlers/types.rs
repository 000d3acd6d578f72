//! Handler types and dependencies

use std::sync::Arc;

use teloxide::types::{Message, User};

use dropcore::{Orchestrator, UserId};

use crate::telegram::sink::TelegramSink;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub orchestrator: Arc<Orchestrator>,
    pub sink: Arc<TelegramSink>,
}

impl HandlerDeps {
    pub fn new(orchestrator: Arc<Orchestrator>, sink: Arc<TelegramSink>) -> Self {
        Self { orchestrator, sink }
    }
}

/// Session key for a Telegram user.
pub fn session_user(user: &User) -> Option<UserId> {
    i64::try_from(user.id.0).ok().map(UserId)
}

/// Session key for the sender of a message.
pub fn message_user(msg: &Message) -> Option<UserId> {
    msg.from.as_ref().and_then(session_user)
}
