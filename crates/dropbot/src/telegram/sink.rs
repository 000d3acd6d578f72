//! Telegram implementation of the notification sink.

use std::path::Path;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode};
use teloxide::utils::html;

use dropcore::{MenuOption, NotificationSink, OutboundPrompt, SinkError, UserId};

use super::callbacks;

/// Sends texts, documents and inline menus through the Bot API.
///
/// Sessions live in private chats, so a user's id doubles as the chat id.
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
    max_upload_bytes: u64,
}

impl TelegramSink {
    pub fn new(bot: Bot, max_upload_bytes: u64) -> Self {
        Self { bot, max_upload_bytes }
    }

    fn chat(recipient: UserId) -> ChatId {
        ChatId(recipient.0)
    }
}

fn transport(e: teloxide::RequestError) -> SinkError {
    SinkError::Transport(e.to_string())
}

/// One button per row, in menu order.
pub fn keyboard(options: &[MenuOption]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        options
            .iter()
            .map(|option| vec![InlineKeyboardButton::callback(option.label(), callbacks::encode(option))]),
    )
}

/// HTML body with the command line in a copyable `<code>` block.
pub fn render_html(prompt: &OutboundPrompt) -> String {
    match &prompt.command {
        Some(command) => format!("{}\n\n<code>{}</code>", html::escape(&prompt.text), html::escape(command)),
        None => html::escape(&prompt.text),
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send_text(&self, recipient: UserId, text: &str) -> Result<(), SinkError> {
        self.bot
            .send_message(Self::chat(recipient), text)
            .await
            .map(|_| ())
            .map_err(transport)
    }

    async fn send_file(&self, recipient: UserId, path: &Path, caption: &str) -> Result<(), SinkError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| SinkError::Transport(format!("cannot read {}: {}", path.display(), e)))?
            .len();
        if size > self.max_upload_bytes {
            return Err(SinkError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        log::debug!("Uploading {} ({} bytes) to {}", path.display(), size, recipient);
        self.bot
            .send_document(Self::chat(recipient), InputFile::file(path.to_path_buf()))
            .caption(caption)
            .await
            .map(|_| ())
            .map_err(transport)
    }

    async fn present_menu(&self, recipient: UserId, prompt: &str, options: &[MenuOption]) -> Result<(), SinkError> {
        self.bot
            .send_message(Self::chat(recipient), prompt)
            .reply_markup(keyboard(options))
            .await
            .map(|_| ())
            .map_err(transport)
    }

    async fn send_prompt(&self, recipient: UserId, prompt: &OutboundPrompt) -> Result<(), SinkError> {
        let request = self
            .bot
            .send_message(Self::chat(recipient), render_html(prompt))
            .parse_mode(ParseMode::Html);
        let request = if prompt.has_menu() {
            request.reply_markup(keyboard(&prompt.options))
        } else {
            request
        };
        request.await.map(|_| ()).map_err(transport)
    }
}
