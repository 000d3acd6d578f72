use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use teloxide::prelude::*;

use dropbot::cli::{Cli, Commands};
use dropbot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps, TelegramSink};
use dropcore::core::config;
use dropcore::core::logging::parse_level;
use dropcore::core::validation::{validate_youtube_url, YoutubeUrlValidator};
use dropcore::core::{init_logger, log_worker_configuration};
use dropcore::{Category, JobDescriptorBuilder, Orchestrator, OrchestratorConfig, Quality, UserId};

/// Main entry point for the Telegram bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, bot creation) or the
/// `command` subcommand gets invalid input.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    // .env first so LOG_LEVEL and friends from it apply
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH, parse_level(&config::LOG_LEVEL))?;

    match cli.command {
        None | Some(Commands::Run) => run_bot().await,
        Some(Commands::Command {
            url,
            category,
            quality,
            user,
        }) => print_command(&url, &category, quality.as_deref(), UserId(user)),
    }
}

/// Prints the command line the bot would hand out for these choices.
fn print_command(url: &str, category: &str, quality: Option<&str>, user: UserId) -> Result<()> {
    let url = validate_youtube_url(url)?;
    let category = Category::from_code(category)?;
    let quality = quality.map(Quality::parse).transpose()?;

    let builder = JobDescriptorBuilder::new(&OrchestratorConfig::from_env());
    println!("{}", builder.command_line(user, url.as_str(), category, quality.as_ref()));
    Ok(())
}

async fn run_bot() -> Result<()> {
    log::info!("Starting dropbot...");

    let orchestrator_config = OrchestratorConfig::from_env();
    log_worker_configuration(&orchestrator_config);

    let bot = create_bot()?;
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let sink = Arc::new(TelegramSink::new(bot.clone(), config::upload::max_upload_bytes()));
    let orchestrator = Arc::new(Orchestrator::new(
        &orchestrator_config,
        Arc::new(YoutubeUrlValidator),
        sink.clone(),
    ));

    let sweeper = spawn_session_sweeper(Arc::clone(&orchestrator), config::session::sweep_interval());

    let deps = HandlerDeps::new(Arc::clone(&orchestrator), sink);
    log::info!("📡 Ready to receive updates");

    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Dispatcher stopped, cancelling running jobs");
    sweeper.abort();
    orchestrator.shutdown().await;
    Ok(())
}

/// Periodically drops idle sessions.
fn spawn_session_sweeper(orchestrator: Arc<Orchestrator>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = orchestrator.purge_idle();
            log::debug!("Session sweep removed {} slot(s)", removed);
        }
    })
}
