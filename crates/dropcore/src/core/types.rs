use std::fmt;
use std::str::FromStr;

use strum::{EnumIter, IntoEnumIterator};

use crate::core::error::JobError;

/// Stable opaque identity of the person talking to the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the user wants derived from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Category {
    Video,
    Audio,
    Thumbnail,
    Subtitles,
    All,
}

impl Category {
    /// Wire code used in callback data and on the CLI.
    pub fn as_code(&self) -> &'static str {
        match self {
            Category::Video => "video",
            Category::Audio => "audio",
            Category::Thumbnail => "image",
            Category::Subtitles => "subtitles",
            Category::All => "all",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Video => "Download Video",
            Category::Audio => "Download Audio",
            Category::Thumbnail => "Download Thumbnail",
            Category::Subtitles => "Download Subtitles",
            Category::All => "Download All",
        }
    }

    /// Parses a wire code. Unknown codes fail closed with `UnsupportedCategory`.
    pub fn from_code(code: &str) -> Result<Self, JobError> {
        match code.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Category::Video),
            "audio" => Ok(Category::Audio),
            "image" | "thumbnail" => Ok(Category::Thumbnail),
            "subtitles" => Ok(Category::Subtitles),
            "all" => Ok(Category::All),
            _ => Err(JobError::UnsupportedCategory(code.to_string())),
        }
    }

    /// Full-video direct downloads are disallowed to bound server storage and bandwidth.
    pub fn allows_direct_download(&self) -> bool {
        !matches!(self, Category::Video)
    }

    /// Categories in menu order.
    pub fn menu_order() -> Vec<Category> {
        Category::iter().collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl FromStr for Category {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::from_code(s)
    }
}

/// How the user wants the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    /// Server runs the worker and sends the files.
    DirectDownload,
    /// Server only replies with the equivalent command line.
    ObtainCommand,
}

impl DeliveryMode {
    pub fn as_code(&self) -> &'static str {
        match self {
            DeliveryMode::DirectDownload => "direct",
            DeliveryMode::ObtainCommand => "command",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "direct" => Some(DeliveryMode::DirectDownload),
            "command" => Some(DeliveryMode::ObtainCommand),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DeliveryMode::DirectDownload => "Download Directly",
            DeliveryMode::ObtainCommand => "Get Download Command",
        }
    }
}

/// Video resolution cap (`None` height means best available).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quality {
    label: String,
    max_height: Option<u32>,
}

impl Quality {
    pub const SUPPORTED: [&'static str; 7] = ["2160p", "1440p", "1080p", "720p", "480p", "360p", "best"];

    pub fn parse(raw: &str) -> Result<Self, JobError> {
        let label = raw.trim().to_ascii_lowercase();
        if !Self::SUPPORTED.contains(&label.as_str()) {
            return Err(JobError::Validation(format!(
                "unknown quality '{}', use one of: {}",
                raw.trim(),
                Self::SUPPORTED.join(", ")
            )));
        }
        let max_height = label.strip_suffix('p').and_then(|h| h.parse::<u32>().ok());
        Ok(Self { label, max_height })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn max_height(&self) -> Option<u32> {
        self.max_height
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Display-only classification of a produced file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Video,
    Audio,
    Image,
    Subtitle,
    Other,
}

impl ArtifactKind {
    /// Extension heuristic; never used for correctness decisions.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "mkv" | "webm" | "mov" | "avi" | "flv" => ArtifactKind::Video,
            "m4a" | "mp3" | "opus" | "ogg" | "aac" | "wav" | "flac" => ArtifactKind::Audio,
            "jpg" | "jpeg" | "png" | "webp" | "gif" => ArtifactKind::Image,
            "vtt" | "srt" | "ass" | "ttml" | "srv3" | "json3" => ArtifactKind::Subtitle,
            _ => ArtifactKind::Other,
        }
    }

    pub fn caption(&self) -> &'static str {
        match self {
            ArtifactKind::Video => "🎬 Video",
            ArtifactKind::Audio => "🎵 Audio",
            ArtifactKind::Image => "🖼 Thumbnail",
            ArtifactKind::Subtitle => "📝 Subtitles",
            ArtifactKind::Other => "📎 File",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_codes_round_trip_through_parser() {
        for category in Category::menu_order() {
            assert_eq!(Category::from_code(category.as_code()).unwrap(), category);
        }
    }

    #[test]
    fn test_thumbnail_alias() {
        assert_eq!("thumbnail".parse::<Category>().unwrap(), Category::Thumbnail);
        assert_eq!(" IMAGE ".parse::<Category>().unwrap(), Category::Thumbnail);
    }

    #[test]
    fn test_unknown_category_is_unsupported() {
        let err = Category::from_code("podcast").unwrap_err();
        assert!(matches!(err, JobError::UnsupportedCategory(ref code) if code == "podcast"));
    }

    #[test]
    fn test_only_video_forbids_direct_download() {
        assert!(!Category::Video.allows_direct_download());
        assert!(Category::Audio.allows_direct_download());
        assert!(Category::Thumbnail.allows_direct_download());
        assert!(Category::Subtitles.allows_direct_download());
        assert!(Category::All.allows_direct_download());
    }

    #[test]
    fn test_quality_parse() {
        let q = Quality::parse("720P").unwrap();
        assert_eq!(q.label(), "720p");
        assert_eq!(q.max_height(), Some(720));

        let best = Quality::parse("best").unwrap();
        assert_eq!(best.max_height(), None);

        assert!(matches!(Quality::parse("4k"), Err(JobError::Validation(_))));
    }

    #[test]
    fn test_artifact_kind_from_extension() {
        assert_eq!(ArtifactKind::from_extension("webm"), ArtifactKind::Video);
        assert_eq!(ArtifactKind::from_extension("M4A"), ArtifactKind::Audio);
        assert_eq!(ArtifactKind::from_extension("webp"), ArtifactKind::Image);
        assert_eq!(ArtifactKind::from_extension("vtt"), ArtifactKind::Subtitle);
        assert_eq!(ArtifactKind::from_extension("part"), ArtifactKind::Other);
    }

    #[test]
    fn test_delivery_mode_codes() {
        assert_eq!(DeliveryMode::from_code("direct"), Some(DeliveryMode::DirectDownload));
        assert_eq!(DeliveryMode::from_code("command"), Some(DeliveryMode::ObtainCommand));
        assert_eq!(DeliveryMode::from_code("other"), None);
    }
}
