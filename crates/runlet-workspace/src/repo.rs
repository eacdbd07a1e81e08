// SPDX-License-Identifier: MIT OR Apache-2.0
//! Repository cloning with captured output and a bounded runtime.
//!
//! The outcome mirrors the engine's event contract: git's own failures
//! land in the outcome as a return code plus output lines, and a missing
//! `git` binary maps to return code -1 with a descriptive stderr line
//! rather than an error.

use crate::WorkspaceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Wall-clock budget for a clone before it is killed.
pub const CLONE_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured result of one `git clone` invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneOutcome {
    /// The command line that was run, for display.
    pub command: String,
    /// git's exit code, or -1 when git was missing, timed out, or died
    /// without a code.
    pub return_code: i32,
    /// Captured standard output, split into lines.
    pub stdout_lines: Vec<String>,
    /// Captured standard error, split into lines.
    pub stderr_lines: Vec<String>,
}

impl CloneOutcome {
    /// `true` when git exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.return_code == 0
    }
}

/// Clone `url` into `dest` with the default [`CLONE_TIMEOUT`].
///
/// With `clean_dest`, an existing destination is removed first.
///
/// # Errors
///
/// Only local filesystem failures (cleaning the destination, collecting
/// output) are errors; everything git does is reported in the outcome.
pub async fn clone_repository(
    url: &str,
    dest: &Path,
    clean_dest: bool,
) -> Result<CloneOutcome, WorkspaceError> {
    clone_with_timeout(url, dest, clean_dest, CLONE_TIMEOUT).await
}

/// [`clone_repository`] with an explicit wall-clock budget.
///
/// # Errors
///
/// See [`clone_repository`].
pub async fn clone_with_timeout(
    url: &str,
    dest: &Path,
    clean_dest: bool,
    timeout: Duration,
) -> Result<CloneOutcome, WorkspaceError> {
    if clean_dest && dest.exists() {
        debug!(dest = %dest.display(), "removing existing clone destination");
        std::fs::remove_dir_all(dest).map_err(|source| WorkspaceError::Io {
            action: "remove",
            path: dest.to_path_buf(),
            source,
        })?;
    }

    let command = format!("git clone {url} {}", dest.display());
    debug!(%command, "cloning repository");

    let child = Command::new("git")
        .arg("clone")
        .arg(url)
        .arg(dest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(child) => child,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!("git executable not found on PATH");
            return Ok(CloneOutcome {
                command,
                return_code: -1,
                stdout_lines: Vec::new(),
                stderr_lines: vec!["git executable not found on PATH".to_string()],
            });
        }
        Err(source) => {
            return Err(WorkspaceError::Io {
                action: "clone into",
                path: dest.to_path_buf(),
                source,
            });
        }
    };

    // On timeout the dropped future kills the child via kill_on_drop.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CloneOutcome {
            command,
            return_code: output.status.code().unwrap_or(-1),
            stdout_lines: lines_of(&output.stdout),
            stderr_lines: lines_of(&output.stderr),
        }),
        Ok(Err(source)) => Err(WorkspaceError::Io {
            action: "clone into",
            path: dest.to_path_buf(),
            source,
        }),
        Err(_) => {
            warn!(%command, seconds = timeout.as_secs(), "clone timed out");
            Ok(CloneOutcome {
                command,
                return_code: -1,
                stdout_lines: Vec::new(),
                stderr_lines: vec![format!(
                    "git clone timed out after {} seconds",
                    timeout.as_secs()
                )],
            })
        }
    }
}

fn lines_of(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
