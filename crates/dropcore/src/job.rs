//! Job descriptor building.
//!
//! Pure mapping from (source reference, category, quality) to the worker
//! argument vector and a per-job working directory. Nothing here touches the
//! filesystem or spawns anything.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::core::config::OrchestratorConfig;
use crate::core::types::{ArtifactKind, Category, Quality, UserId};

/// Output template appended to the working directory.
const OUTPUT_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Client-side downloads directory used in commands handed to the user.
const CLIENT_DOWNLOADS_DIR: &str = "downloads";

/// Per-job disambiguator; two jobs never share one even for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Fully specified job. Immutable once built; consumed by one executor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub id: JobId,
    pub user_id: UserId,
    pub source_ref: String,
    pub category: Category,
    pub quality: Option<Quality>,
    pub working_dir: PathBuf,
    pub worker_program: String,
    pub worker_args: Vec<String>,
    pub expected_artifact_kinds: BTreeSet<ArtifactKind>,
}

/// Artifact kinds a successful run of `category` is expected to yield.
pub fn expected_artifact_kinds(category: Category) -> BTreeSet<ArtifactKind> {
    match category {
        Category::Video => BTreeSet::from([ArtifactKind::Video]),
        Category::Audio => BTreeSet::from([ArtifactKind::Audio]),
        Category::Thumbnail => BTreeSet::from([ArtifactKind::Image]),
        Category::Subtitles => BTreeSet::from([ArtifactKind::Subtitle]),
        Category::All => BTreeSet::from([ArtifactKind::Video, ArtifactKind::Image, ArtifactKind::Subtitle]),
    }
}

/// Builds [`JobDescriptor`]s and the equivalent user-runnable command lines.
#[derive(Debug, Clone)]
pub struct JobDescriptorBuilder {
    worker_program: String,
    worker_leading_args: Vec<String>,
    downloads_root: PathBuf,
    subtitle_lang: String,
    cookies_file: Option<String>,
}

impl JobDescriptorBuilder {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            worker_program: config.worker_program.clone(),
            worker_leading_args: config.worker_leading_args.clone(),
            downloads_root: config.downloads_root.clone(),
            subtitle_lang: config.subtitle_lang.clone(),
            cookies_file: config.cookies_file.clone(),
        }
    }

    pub fn downloads_root(&self) -> &Path {
        &self.downloads_root
    }

    /// Working directory for one job: `<root>/<user>-<job id>`.
    pub fn working_dir_for(&self, user_id: UserId, job_id: JobId) -> PathBuf {
        self.downloads_root.join(format!("{}-{}", user_id, job_id))
    }

    /// Builds the descriptor for one direct-download run.
    ///
    /// Deterministic for a given `job_id`; callers allocate a fresh [`JobId`] per job.
    pub fn build(
        &self,
        user_id: UserId,
        source_ref: &str,
        category: Category,
        quality: Option<&Quality>,
        job_id: JobId,
    ) -> JobDescriptor {
        let working_dir = self.working_dir_for(user_id, job_id);

        let mut worker_args = self.worker_leading_args.clone();
        if let Some(cookies) = &self.cookies_file {
            worker_args.push("--cookies".to_string());
            worker_args.push(cookies.clone());
        }
        worker_args.extend(self.category_args(&working_dir, source_ref, category, quality));

        JobDescriptor {
            id: job_id,
            user_id,
            source_ref: source_ref.to_string(),
            category,
            quality: quality.cloned(),
            working_dir,
            worker_program: self.worker_program.clone(),
            worker_args,
            expected_artifact_kinds: expected_artifact_kinds(category),
        }
    }

    /// Externally runnable command for the "get command" delivery mode.
    ///
    /// Uses a client-side relative output directory and no server-only flags.
    pub fn command_line(
        &self,
        user_id: UserId,
        source_ref: &str,
        category: Category,
        quality: Option<&Quality>,
    ) -> String {
        let output_dir = Path::new(CLIENT_DOWNLOADS_DIR).join(user_id.to_string());
        let mut words = vec![self.worker_program.clone()];
        words.extend(self.worker_leading_args.iter().cloned());
        words.extend(self.category_args(&output_dir, source_ref, category, quality));

        words
            .iter()
            .map(|word| shell_escape::escape(word.as_str().into()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn category_args(
        &self,
        output_dir: &Path,
        source_ref: &str,
        category: Category,
        quality: Option<&Quality>,
    ) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match category {
            Category::Video => {
                if let Some(height) = quality.and_then(Quality::max_height) {
                    args.push("-f".to_string());
                    args.push(format!(
                        "bestvideo[height<={h}]+bestaudio/best[height<={h}]",
                        h = height
                    ));
                }
            }
            Category::Audio => {
                args.push("-f".to_string());
                args.push("bestaudio/best".to_string());
            }
            Category::Thumbnail => {
                args.push("--write-thumbnail".to_string());
                args.push("--skip-download".to_string());
            }
            Category::Subtitles => {
                args.push("--write-auto-sub".to_string());
                args.push("--sub-lang".to_string());
                args.push(self.subtitle_lang.clone());
                args.push("--skip-download".to_string());
            }
            Category::All => {
                args.push("--write-auto-sub".to_string());
                args.push("--sub-lang".to_string());
                args.push(self.subtitle_lang.clone());
                args.push("--write-thumbnail".to_string());
            }
        }

        args.push("--output".to_string());
        args.push(output_dir.join(OUTPUT_TEMPLATE).to_string_lossy().into_owned());
        // `--` keeps a source starting with '-' from being read as a flag.
        args.push("--".to_string());
        args.push(source_ref.to_string());
        args
    }
}
