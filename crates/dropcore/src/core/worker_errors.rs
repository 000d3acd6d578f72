//! Classification of worker (yt-dlp) stderr output
//!
//! Used to append a short hint to failure messages. The raw stderr excerpt is
//! always shown as well, so an unknown classification loses nothing.

use once_cell::sync::Lazy;
use regex::Regex;

/// yt-dlp prefixes fatal messages with `ERROR:`
static ERROR_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^ERROR:\s*(?:\[[^\]]+\]\s*)?(?:[\w-]+:\s+)?(.+)$").expect("error line regex is valid"));

/// Worker failure kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerErrorType {
    /// Cookies missing/expired or the site asks to sign in
    Authentication,
    /// Media is private, removed or region-blocked
    MediaUnavailable,
    /// Timeouts, DNS, refused connections
    NetworkError,
    /// Our own timeout fired
    TimedOut,
    Unknown,
}

/// Analyzes worker stderr and determines the error type
pub fn analyze_worker_error(stderr: &str) -> WorkerErrorType {
    let stderr_lower = stderr.to_lowercase();

    if stderr_lower.contains("timed out after") {
        return WorkerErrorType::TimedOut;
    }

    if stderr_lower.contains("cookies are no longer valid")
        || stderr_lower.contains("sign in to confirm")
        || stderr_lower.contains("please sign in")
        || stderr_lower.contains("use --cookies")
    {
        return WorkerErrorType::Authentication;
    }

    if stderr_lower.contains("private video")
        || stderr_lower.contains("video unavailable")
        || stderr_lower.contains("is not available")
        || stderr_lower.contains("has been removed")
        || stderr_lower.contains("does not exist")
    {
        return WorkerErrorType::MediaUnavailable;
    }

    if stderr_lower.contains("network")
        || stderr_lower.contains("connection")
        || stderr_lower.contains("timeout")
        || stderr_lower.contains("socket")
        || stderr_lower.contains("dns")
        || stderr_lower.contains("failed to connect")
    {
        return WorkerErrorType::NetworkError;
    }

    WorkerErrorType::Unknown
}

/// Last `ERROR:` line of the worker output, without the prefix and extractor tag.
pub fn primary_error_line(stderr: &str) -> Option<String> {
    ERROR_LINE_RE
        .captures_iter(stderr)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|line| !line.is_empty())
}

/// Hint appended to the user-visible failure message
pub fn worker_error_hint(error_type: &WorkerErrorType) -> Option<&'static str> {
    match error_type {
        WorkerErrorType::Authentication => Some("The site asked for authentication. Try another link or retry later."),
        WorkerErrorType::MediaUnavailable => {
            Some("The media looks unavailable: it may be private, removed or blocked in this region.")
        }
        WorkerErrorType::NetworkError => Some("Looks like a network problem. Try again in a minute."),
        WorkerErrorType::TimedOut => Some("The download took too long. Try a smaller option."),
        WorkerErrorType::Unknown => None,
    }
}
