//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

use dropcore::{Advance, NotificationSink, OutboundPrompt, SessionEvent, UserId};

use super::types::{message_user, session_user, HandlerDeps, HandlerError};
use crate::telegram::bot::Command;
use crate::telegram::callbacks;

const WELCOME_TEXT: &str = "Send me a YouTube link and I will offer the video, its audio, the thumbnail or the subtitles.\n\
Full videos are only available as a command you run yourself.";

/// Creates the main dispatcher schema for the Telegram bot.
///
/// # Arguments
/// * `deps` - Orchestrator and sink shared by all handlers
///
/// # Returns
/// The complete handler tree for the bot
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps.clone();
    let deps_callback = deps;

    dptree::entry()
        .branch(command_handler(deps_commands))
        // Any other text in a private chat is treated as a source link
        .branch(message_handler(deps_messages))
        .branch(callback_handler(deps_callback))
}

/// Advances the user's session and shows the resulting prompt.
///
/// The transition is applied before returning, so events keep their arrival
/// order. A direct download then runs on its own task: updates for this chat
/// keep flowing and further taps get a "busy" answer instead of waiting in line.
async fn run_event(deps: &HandlerDeps, user: UserId, event: SessionEvent) {
    match deps.orchestrator.begin(user, event).await {
        Advance::Reply(prompt) => show_prompt(deps, user, &prompt).await,
        Advance::Job(job) => {
            let deps = deps.clone();
            tokio::spawn(async move {
                let prompt = deps.orchestrator.run(job).await;
                show_prompt(&deps, user, &prompt).await;
            });
        }
    }
}

async fn show_prompt(deps: &HandlerDeps, user: UserId, prompt: &OutboundPrompt) {
    if let Err(e) = deps.sink.send_prompt(user, prompt).await {
        log::error!("Failed to send prompt to user {}: {}", user, e);
    }
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("Received command: {:?} from chat {}", cmd, msg.chat.id);

                match cmd {
                    Command::Start => {
                        if let Some(user) = message_user(&msg) {
                            // Starting over drops the session and stops any running job.
                            deps.orchestrator.advance(user, SessionEvent::ResetRequested).await;
                        }
                        bot.send_message(msg.chat.id, WELCOME_TEXT).await?;
                    }
                    Command::Help => {
                        bot.send_message(msg.chat.id, Command::descriptions().to_string())
                            .await?;
                    }
                    Command::Cancel => {
                        if let Some(user) = message_user(&msg) {
                            run_event(&deps, user, SessionEvent::ResetRequested).await;
                        }
                    }
                    Command::Quality(raw) => {
                        if let Some(user) = message_user(&msg) {
                            run_event(&deps, user, SessionEvent::QualityChosen(raw)).await;
                        }
                    }
                }
                Ok(())
            }
        },
    ))
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private() && msg.text().is_some())
        .endpoint(move |msg: Message| {
            let deps = deps.clone();
            async move {
                let (Some(user), Some(text)) = (message_user(&msg), msg.text()) else {
                    return Ok(());
                };
                log::debug!("Text from user {}: {}", user, text);
                run_event(&deps, user, SessionEvent::SourceSubmitted(text.to_string())).await;
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            // Stop the button spinner before doing any work.
            if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
                log::warn!("Failed to answer callback query: {}", e);
            }

            let Some(user) = session_user(&q.from) else {
                return Ok(());
            };
            let data = q.data.as_deref().unwrap_or_default();

            match callbacks::decode(data) {
                Ok(event) => run_event(&deps, user, event).await,
                Err(e) => {
                    log::warn!("Rejected callback data {:?} from user {}: {}", data, user, e);
                    if let Err(e) = deps.sink.send_text(user, &e.user_message()).await {
                        log::error!("Failed to notify user {}: {}", user, e);
                    }
                }
            }
            Ok(())
        }
    })
}
