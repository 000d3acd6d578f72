//! Telegram transport: bot setup, update handlers and the notification sink

pub mod bot;
pub mod callbacks;
pub mod handlers;
pub mod sink;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use sink::TelegramSink;
