//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - Worker configuration check logged at startup

use anyhow::Result;
use simplelog::*;
use std::fs::File;
use std::path::Path;

use crate::core::config::OrchestratorConfig;

/// Parses a textual level, falling back to `Info`.
pub fn parse_level(raw: &str) -> LevelFilter {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
/// * `level` - Level applied to both outputs
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to create the file or a logger was already set
pub fn init_logger(log_file_path: &str, level: LevelFilter) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the worker setup at application startup
///
/// Reports the worker command, downloads root, timeout, subtitle language
/// and whether the configured cookies file actually exists.
pub fn log_worker_configuration(config: &OrchestratorConfig) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🔧 Worker Configuration");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if config.worker_leading_args.is_empty() {
        log::info!("Worker: {}", config.worker_program);
    } else {
        log::info!(
            "Worker: {} {}",
            config.worker_program,
            config.worker_leading_args.join(" ")
        );
    }
    log::info!("Downloads root: {}", config.downloads_root.display());
    log::info!("Worker timeout: {}s", config.worker_timeout.as_secs());
    log::info!("Subtitle language: {}", config.subtitle_lang);
    log::info!("Idle session TTL: {}s", config.session_idle_ttl.as_secs());

    match config.cookies_file.as_deref() {
        Some(path) if Path::new(path).exists() => {
            log::info!("✅ YTDL_COOKIES_FILE: {}", path);
        }
        Some(path) => {
            log::error!("❌ YTDL_COOKIES_FILE: {} (FILE NOT FOUND!)", path);
            log::error!("   Current directory: {:?}", std::env::current_dir());
        }
        None => {
            log::warn!("⚠️  YTDL_COOKIES_FILE: not set, some sources may refuse anonymous downloads");
        }
    }
}
