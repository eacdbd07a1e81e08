// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-run cleanup: phase bookkeeping, script disposal, and escalating
//! child termination.
//!
//! Every exit path of a run funnels through a [`LifecycleGuard`] so the
//! wrapper script is removed and the phase machine is settled no matter
//! how the run ended.

use runlet_core::{PhaseTracker, RunPhase};
use std::process::ExitStatus;
use std::time::Duration;
use tempfile::TempPath;
use tokio::process::Child;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// LifecycleGuard
// ---------------------------------------------------------------------------

/// Owns the disposable resources of one run.
///
/// The guard holds the wrapper script (when one was materialized) and the
/// phase tracker. The driver keeps ownership of the [`Child`] and lends it
/// for shutdown.
pub struct LifecycleGuard {
    kill_grace: Duration,
    script: Option<TempPath>,
    phases: PhaseTracker,
}

impl LifecycleGuard {
    /// New guard with the given grace period between termination steps.
    #[must_use]
    pub fn new(kill_grace: Duration) -> Self {
        Self {
            kill_grace,
            script: None,
            phases: PhaseTracker::new(),
        }
    }

    /// Register a materialized wrapper script for later disposal.
    pub fn attach_script(&mut self, script: TempPath) {
        self.script = Some(script);
    }

    /// Phase tracker for this run.
    #[must_use]
    pub fn phases(&self) -> &PhaseTracker {
        &self.phases
    }

    /// Advance the run phase, downgrading an illegal transition to a log
    /// line.
    ///
    /// The call sites are all on hot exit paths where a phase hiccup must
    /// never mask the real outcome of the run.
    pub fn advance(&mut self, to: RunPhase, reason: Option<String>) {
        if let Err(error) = self.phases.advance(to, reason) {
            debug!(%error, "phase not advanced");
        }
    }

    /// Terminate the child, escalating after `kill_grace`.
    ///
    /// Sends a graceful termination request first and waits up to the
    /// grace period; a survivor gets a hard kill and one more bounded
    /// wait. Returns the exit status when one was collected.
    pub async fn shutdown(&mut self, child: &mut Child, why: &str) -> Option<ExitStatus> {
        debug!(why, "terminating child");
        request_termination(child);
        if let Ok(Ok(status)) = tokio::time::timeout(self.kill_grace, child.wait()).await {
            return Some(status);
        }

        warn!(why, "child ignored graceful termination; killing");
        if let Err(error) = child.start_kill() {
            debug!(%error, "kill failed; child likely already gone");
        }
        match tokio::time::timeout(self.kill_grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(error)) => {
                warn!(%error, "wait failed after kill");
                None
            }
            Err(_) => {
                warn!("child still alive after kill grace period");
                None
            }
        }
    }

    /// Remove the wrapper script if one is attached. Failure to remove is
    /// logged, never fatal.
    pub fn dispose_script(&mut self) {
        if let Some(script) = self.script.take() {
            let path = script.to_path_buf();
            if let Err(error) = script.close() {
                warn!(path = %path.display(), %error, "failed to remove wrapper script");
            } else {
                debug!(path = %path.display(), "wrapper script removed");
            }
        }
    }

    /// Final disposal: drop the script and settle the phase machine.
    pub fn finish(&mut self, reason: Option<String>) {
        self.dispose_script();
        self.advance(RunPhase::CleanedUp, reason);
    }
}

// ---------------------------------------------------------------------------
// Graceful termination request
// ---------------------------------------------------------------------------

/// Ask the child to terminate without force.
///
/// On POSIX this delivers `SIGTERM` so the child can run its handlers; a
/// reaped child (no pid) is skipped. Elsewhere there is no portable
/// graceful signal and the request is already the hard kill.
#[cfg(unix)]
#[allow(unsafe_code)]
fn request_termination(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: kill(2) takes a pid and a signal number by value; no
    // memory is shared with the callee.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, "SIGTERM delivery failed; child likely already exited");
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(error) = child.start_kill() {
        debug!(%error, "kill failed; child likely already exited");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
