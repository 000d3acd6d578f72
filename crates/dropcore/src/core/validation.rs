//! Source reference validation
//!
//! The orchestrator only needs a yes/no answer from a [`SourceValidator`];
//! [`YoutubeUrlValidator`] is the whitelist-based implementation used by the bot.

use thiserror::Error;
use url::Url;

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid URL format or non-YouTube domain
    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),
}

/// Decides whether raw user text is an acceptable source reference.
pub trait SourceValidator: Send + Sync {
    fn is_valid_source(&self, raw: &str) -> bool;
}

/// Accepts http(s) links to youtube.com (and subdomains), youtu.be and youtube-nocookie.com.
/// A missing scheme is tolerated (`youtu.be/abc` is treated as `https://youtu.be/abc`).
#[derive(Debug, Default, Clone, Copy)]
pub struct YoutubeUrlValidator;

impl SourceValidator for YoutubeUrlValidator {
    fn is_valid_source(&self, raw: &str) -> bool {
        validate_youtube_url(raw).is_ok()
    }
}

/// Validates that a URL is a YouTube URL with a non-empty path.
///
/// # Examples
/// ```
/// use dropcore::core::validation::validate_youtube_url;
///
/// assert!(validate_youtube_url("https://youtu.be/abc123").is_ok());
/// assert!(validate_youtube_url("www.youtube.com/watch?v=abc123").is_ok());
/// assert!(validate_youtube_url("https://evil.com/watch?v=abc123").is_err());
/// assert!(validate_youtube_url("not a url").is_err());
/// ```
pub fn validate_youtube_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidUrl(trimmed.to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).map_err(|_| ValidationError::InvalidUrl(trimmed.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidUrl(format!(
            "{} (invalid scheme: {})",
            trimmed,
            parsed.scheme()
        )));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| ValidationError::InvalidUrl(format!("{} (no host)", trimmed)))?;

    let is_youtube = host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtu.be"
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com");

    if !is_youtube {
        return Err(ValidationError::InvalidUrl(format!(
            "{} (not a YouTube domain: {})",
            trimmed, host
        )));
    }

    // Bare domain without a video reference is useless to the worker.
    if parsed.path().trim_matches('/').is_empty() && parsed.query().is_none() {
        return Err(ValidationError::InvalidUrl(format!("{} (no media reference)", trimmed)));
    }

    Ok(parsed)
}
