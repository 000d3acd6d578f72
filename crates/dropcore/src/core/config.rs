use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Worker command line.
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp".
/// Whitespace-separated words are allowed so launchers like `python3 -m yt_dlp` work.
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Path to cookies file passed to the worker for direct downloads
/// Read from YTDL_COOKIES_FILE environment variable
pub static YTDL_COOKIES_FILE: Lazy<Option<String>> = Lazy::new(|| {
    env::var("YTDL_COOKIES_FILE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
});

/// Root downloads area; every job gets its own subdirectory here.
/// Read from DOWNLOAD_FOLDER environment variable, supports tilde (~) expansion
/// Default: downloads
pub static DOWNLOAD_FOLDER: Lazy<String> =
    Lazy::new(|| env::var("DOWNLOAD_FOLDER").unwrap_or_else(|_| "downloads".to_string()));

/// Language requested for auto-generated subtitles
/// Read from SUBTITLE_LANG environment variable
/// Default: ar
pub static SUBTITLE_LANG: Lazy<String> =
    Lazy::new(|| env::var("SUBTITLE_LANG").unwrap_or_else(|_| "ar".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: app.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "app.log".to_string()));

/// Log level (error, warn, info, debug, trace)
/// Read from LOG_LEVEL environment variable
pub static LOG_LEVEL: Lazy<String> = Lazy::new(|| env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()));

/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Worker process configuration
pub mod download {
    use super::Duration;

    /// Timeout for a single worker run (in seconds)
    pub const WORKER_TIMEOUT_SECS: u64 = 240;

    /// Worker timeout, overridable through WORKER_TIMEOUT_SECS
    pub fn worker_timeout() -> Duration {
        Duration::from_secs(super::env_u64("WORKER_TIMEOUT_SECS", WORKER_TIMEOUT_SECS))
    }
}

/// Session lifetime configuration
pub mod session {
    use super::Duration;

    /// Sessions without activity for this long are dropped (in seconds)
    pub const IDLE_TTL_SECS: u64 = 3600;

    /// Interval between background sweeps of idle sessions (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 300;

    pub fn idle_ttl() -> Duration {
        Duration::from_secs(super::env_u64("SESSION_IDLE_TTL_SECS", IDLE_TTL_SECS))
    }

    pub fn sweep_interval() -> Duration {
        Duration::from_secs(super::env_u64("SESSION_SWEEP_INTERVAL_SECS", SWEEP_INTERVAL_SECS))
    }
}

/// Upload limits
pub mod upload {
    /// Largest file the public Bot API accepts for documents
    pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

    pub fn max_upload_bytes() -> u64 {
        super::env_u64("MAX_UPLOAD_BYTES", MAX_UPLOAD_BYTES)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Bot API calls (in seconds), generous for large uploads
    pub const REQUEST_TIMEOUT_SECS: u64 = 900;

    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Everything the orchestrator needs, resolved into plain values.
///
/// Production code builds this from the environment once; tests construct it directly.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker program (e.g. `yt-dlp`)
    pub worker_program: String,
    /// Arguments placed before the generated ones (e.g. `-m yt_dlp` for a python launcher)
    pub worker_leading_args: Vec<String>,
    /// Root downloads area
    pub downloads_root: PathBuf,
    /// Cookies file handed to the worker, if any
    pub cookies_file: Option<String>,
    /// Auto-generated subtitle language
    pub subtitle_lang: String,
    /// Bound on one worker invocation
    pub worker_timeout: Duration,
    /// Idle-session expiry
    pub session_idle_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_program: "yt-dlp".to_string(),
            worker_leading_args: Vec::new(),
            downloads_root: PathBuf::from("downloads"),
            cookies_file: None,
            subtitle_lang: "ar".to_string(),
            worker_timeout: Duration::from_secs(download::WORKER_TIMEOUT_SECS),
            session_idle_ttl: Duration::from_secs(session::IDLE_TTL_SECS),
        }
    }
}

impl OrchestratorConfig {
    /// Builds the configuration from environment variables (see the statics above).
    pub fn from_env() -> Self {
        let (worker_program, worker_leading_args) = split_command_line(&YTDL_BIN);
        Self {
            worker_program,
            worker_leading_args,
            downloads_root: PathBuf::from(shellexpand::tilde(DOWNLOAD_FOLDER.as_str()).into_owned()),
            cookies_file: YTDL_COOKIES_FILE
                .as_ref()
                .map(|path| shellexpand::tilde(path).into_owned()),
            subtitle_lang: SUBTITLE_LANG.clone(),
            worker_timeout: download::worker_timeout(),
            session_idle_ttl: session::idle_ttl(),
        }
    }
}

/// Splits `YTDL_BIN` into program and leading arguments.
fn split_command_line(raw: &str) -> (String, Vec<String>) {
    let mut words = raw.split_whitespace().map(str::to_string);
    match words.next() {
        Some(program) => (program, words.collect()),
        None => ("yt-dlp".to_string(), Vec::new()),
    }
}
