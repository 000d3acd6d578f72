//! Process execution with timeout and cancellation
//!
//! The worker is spawned with `kill_on_drop`, so abandoning the wait (timeout or
//! cancellation) terminates the child process. On unix it also leads its own
//! process group, and the whole group is killed with it, so helpers the worker
//! started (ffmpeg and the like) do not outlive it.

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// How a bounded process run ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Process exited on its own (any exit code)
    Exited(Output),
    /// Timeout fired, child was killed
    TimedOut(Duration),
    /// Cancellation token fired, child was killed
    Cancelled,
}

/// Kills the child's process group when dropped, unless disarmed.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let status = std::process::Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", pgid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match status {
        Ok(status) if status.success() => log::debug!("Killed process group {}", pgid),
        Ok(_) => log::debug!("Process group {} already gone", pgid),
        Err(e) => log::warn!("Failed to kill process group {}: {}", pgid, e),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Run a Command to completion, bounded by `timeout` and `cancel`.
///
/// Stdout and stderr are captured separately. Returns an IO error only when the
/// process cannot be spawned or waited on.
pub async fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    cancel: &CancellationToken,
) -> std::io::Result<ProcessOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    // With process_group(0) the group id is the child's pid.
    let mut group = ProcessGroupGuard {
        pgid: if cfg!(unix) { child.id() } else { None },
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(ProcessOutcome::Cancelled),
        waited = tokio::time::timeout(timeout, child.wait_with_output()) => match waited {
            Ok(Ok(output)) => {
                group.disarm();
                Ok(ProcessOutcome::Exited(output))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(ProcessOutcome::TimedOut(timeout)),
        },
    }
}
