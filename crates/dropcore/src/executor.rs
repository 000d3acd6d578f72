//! Job execution under a scoped working directory.
//!
//! [`WorkDir`] owns a job's directory and removes it when released or dropped,
//! on every path: success, worker failure, enumeration error, timeout, or
//! cancellation (the executor future being dropped included). Cleanup failures
//! are logged and never returned, so they cannot mask the primary outcome.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::core::config::OrchestratorConfig;
use crate::core::error::{DropResult, JobError};
use crate::core::process::{run_with_timeout, ProcessOutcome};
use crate::core::types::ArtifactKind;
use crate::job::JobDescriptor;

/// One file produced by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn from_path(path: PathBuf) -> Self {
        let kind = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(ArtifactKind::from_extension)
            .unwrap_or(ArtifactKind::Other);
        Self { path, kind }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Outcome of a successful worker run. Artifacts are sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub exit_code: i32,
    pub produced_artifacts: Vec<Artifact>,
    pub stderr_text: String,
}

/// A finished job whose files are still on disk for delivery.
///
/// Call [`CompletedJob::release`] once delivery is done; dropping it removes the
/// directory as well.
#[derive(Debug)]
pub struct CompletedJob {
    pub result: JobResult,
    workdir: WorkDir,
}

impl CompletedJob {
    pub fn working_dir(&self) -> &Path {
        self.workdir.path()
    }

    /// Removes the working directory now that delivery finished.
    pub async fn release(self) {
        self.workdir.release().await;
    }
}

/// Exclusively owned per-job directory, removed on release or drop.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    released: bool,
}

impl WorkDir {
    /// Creates the directory (idempotent when it already exists).
    pub async fn acquire(path: PathBuf) -> DropResult<Self> {
        match fs_err::tokio::create_dir_all(&path).await {
            Ok(()) => Ok(Self { path, released: false }),
            Err(source) => Err(JobError::Storage { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Asynchronous removal; errors are logged, never raised.
    pub async fn release(mut self) {
        self.released = true;
        match fs_err::tokio::remove_dir_all(&self.path).await {
            Ok(()) => log::debug!("Removed working directory {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Failed to remove working directory: {}", e),
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match fs_err::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Removed working directory {} on drop", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::error!("Failed to remove working directory on drop: {}", e),
        }
    }
}

/// Runs [`JobDescriptor`]s through the external worker.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    timeout: std::time::Duration,
}

impl JobExecutor {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            timeout: config.worker_timeout,
        }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self { timeout }
    }

    /// Executes one job.
    ///
    /// On any error the working directory is already gone when this returns. On
    /// success it lives inside the returned [`CompletedJob`] until released.
    pub async fn execute(&self, descriptor: &JobDescriptor, cancel: &CancellationToken) -> DropResult<CompletedJob> {
        let workdir = WorkDir::acquire(descriptor.working_dir.clone()).await?;

        log::info!(
            "Job {} for user {}: running {} ({} args, category {})",
            descriptor.id,
            descriptor.user_id,
            descriptor.worker_program,
            descriptor.worker_args.len(),
            descriptor.category
        );
        log::debug!("Worker args: {:?}", descriptor.worker_args);

        let mut cmd = Command::new(&descriptor.worker_program);
        cmd.args(&descriptor.worker_args);

        let output = match run_with_timeout(&mut cmd, self.timeout, cancel).await {
            Ok(ProcessOutcome::Exited(output)) => output,
            Ok(ProcessOutcome::TimedOut(timeout)) => {
                log::warn!("Job {} timed out after {:?}", descriptor.id, timeout);
                return Err(JobError::WorkerFailure(format!("worker timed out after {:?}", timeout)));
            }
            Ok(ProcessOutcome::Cancelled) => {
                log::info!("Job {} cancelled, worker terminated", descriptor.id);
                return Err(JobError::Cancelled);
            }
            Err(e) => {
                log::error!("Job {}: failed to start {}: {}", descriptor.id, descriptor.worker_program, e);
                return Err(JobError::WorkerFailure(format!(
                    "could not start {}: {}",
                    descriptor.worker_program, e
                )));
            }
        };

        let stderr_text = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // Signal-killed processes have no code.
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            log::warn!(
                "Job {} worker exited with {}: {}",
                descriptor.id,
                exit_code,
                stderr_text
            );
            let reason = if stderr_text.is_empty() {
                format!("worker exited with code {}", exit_code)
            } else {
                stderr_text
            };
            return Err(JobError::WorkerFailure(reason));
        }

        let produced_artifacts = enumerate_artifacts(workdir.path()).await?;
        log::info!(
            "Job {} finished: {} artifact(s)",
            descriptor.id,
            produced_artifacts.len()
        );

        Ok(CompletedJob {
            result: JobResult {
                exit_code,
                produced_artifacts,
                stderr_text,
            },
            workdir,
        })
    }
}

/// Lists every regular file under `root` (recursively), sorted by path.
pub async fn enumerate_artifacts(root: &Path) -> DropResult<Vec<Artifact>> {
    let storage_error = |path: &Path, source: std::io::Error| JobError::Storage {
        path: path.to_path_buf(),
        source,
    };

    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| storage_error(&dir, e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| storage_error(&dir, e))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| storage_error(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files.into_iter().map(Artifact::from_path).collect())
}
