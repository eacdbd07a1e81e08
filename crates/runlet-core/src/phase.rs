// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run lifecycle state machine — tracks and enforces valid phase
//! progression for one execution.
//!
//! The legal forward path is `NotStarted → Running → StreamsDraining →
//! Exited → CleanedUp`. Draining may overlap with the child still running,
//! so `Running → Exited` is also legal when both pipes close before the
//! exit is observed. `CleanedUp` is reachable from any phase: cleanup runs
//! on abandonment and on spawn failure too.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Phase of a single process execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// The plan exists but nothing has been spawned.
    NotStarted,
    /// The child process is alive.
    Running,
    /// At least one pipe has reached end-of-stream; output is being
    /// drained.
    StreamsDraining,
    /// The child has been waited on to completion.
    Exited,
    /// Handles closed, temp files removed; the run is fully disposed.
    CleanedUp,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::StreamsDraining => "streams_draining",
            Self::Exited => "exited",
            Self::CleanedUp => "cleaned_up",
        };
        f.write_str(s)
    }
}

/// Record of a single phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// Phase before the transition.
    pub from: RunPhase,
    /// Phase after the transition.
    pub to: RunPhase,
    /// When the transition occurred.
    pub at: DateTime<Utc>,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// Errors produced by [`PhaseTracker`] when a transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    /// The requested transition is not allowed by the state machine.
    InvalidTransition {
        /// Current phase.
        from: RunPhase,
        /// Requested target phase.
        to: RunPhase,
    },
    /// The tracker is already in the requested phase.
    AlreadyInPhase(RunPhase),
}

impl fmt::Display for PhaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid run phase transition from {from} to {to}")
            }
            Self::AlreadyInPhase(p) => write!(f, "already in phase {p}"),
        }
    }
}

impl std::error::Error for PhaseError {}

/// Tracks the phase of one execution and enforces valid transitions.
#[derive(Debug)]
pub struct PhaseTracker {
    phase: RunPhase,
    history: Vec<PhaseTransition>,
    running_since: Option<Instant>,
}

impl PhaseTracker {
    /// Create a tracker in [`RunPhase::NotStarted`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: RunPhase::NotStarted,
            history: Vec::new(),
            running_since: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Attempt to advance to a new phase.
    ///
    /// # Errors
    ///
    /// [`PhaseError`] when the transition is not allowed or the tracker is
    /// already in the target phase.
    pub fn advance(&mut self, to: RunPhase, reason: Option<String>) -> Result<(), PhaseError> {
        if self.phase == to {
            return Err(PhaseError::AlreadyInPhase(to));
        }
        if !self.can_advance(to) {
            return Err(PhaseError::InvalidTransition {
                from: self.phase,
                to,
            });
        }

        let from = self.phase;
        self.phase = to;

        if to == RunPhase::Running && self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }

        self.history.push(PhaseTransition {
            from,
            to,
            at: Utc::now(),
            reason,
        });
        Ok(())
    }

    /// Returns `true` if advancing from the current phase to `to` is valid.
    #[must_use]
    pub fn can_advance(&self, to: RunPhase) -> bool {
        // Cleanup is reachable from any phase (abandonment, spawn failure).
        if to == RunPhase::CleanedUp {
            return true;
        }

        matches!(
            (self.phase, to),
            (RunPhase::NotStarted, RunPhase::Running)
                | (RunPhase::Running, RunPhase::StreamsDraining)
                | (RunPhase::Running, RunPhase::Exited)
                | (RunPhase::StreamsDraining, RunPhase::Exited)
        )
    }

    /// Full history of phase transitions.
    #[must_use]
    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    /// Time elapsed since the run first entered [`RunPhase::Running`].
    ///
    /// `None` if the child was never spawned.
    #[must_use]
    pub fn running_time(&self) -> Option<Duration> {
        self.running_since.map(|t| t.elapsed())
    }

    /// `true` once the run reached [`RunPhase::CleanedUp`].
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.phase == RunPhase::CleanedUp
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_progression() {
        let mut t = PhaseTracker::new();
        assert_eq!(t.phase(), RunPhase::NotStarted);

        t.advance(RunPhase::Running, None).unwrap();
        t.advance(RunPhase::StreamsDraining, Some("stdout eof".into()))
            .unwrap();
        t.advance(RunPhase::Exited, None).unwrap();
        t.advance(RunPhase::CleanedUp, None).unwrap();

        assert!(t.is_settled());
        assert_eq!(t.history().len(), 4);
    }

    #[test]
    fn exit_without_explicit_draining() {
        let mut t = PhaseTracker::new();
        t.advance(RunPhase::Running, None).unwrap();
        // Both pipes closed before the exit was observed.
        t.advance(RunPhase::Exited, None).unwrap();
        assert_eq!(t.phase(), RunPhase::Exited);
    }

    #[test]
    fn cleanup_reachable_from_every_phase() {
        for stop_at in [
            RunPhase::NotStarted,
            RunPhase::Running,
            RunPhase::StreamsDraining,
            RunPhase::Exited,
        ] {
            let mut t = PhaseTracker::new();
            if stop_at != RunPhase::NotStarted {
                t.advance(RunPhase::Running, None).unwrap();
            }
            if matches!(stop_at, RunPhase::StreamsDraining | RunPhase::Exited) {
                t.advance(RunPhase::StreamsDraining, None).unwrap();
            }
            if stop_at == RunPhase::Exited {
                t.advance(RunPhase::Exited, None).unwrap();
            }
            t.advance(RunPhase::CleanedUp, Some("guard".into())).unwrap();
            assert!(t.is_settled(), "cleanup must succeed from {stop_at}");
        }
    }

    #[test]
    fn skipping_spawn_is_rejected() {
        let mut t = PhaseTracker::new();
        let err = t.advance(RunPhase::StreamsDraining, None).unwrap_err();
        assert_eq!(
            err,
            PhaseError::InvalidTransition {
                from: RunPhase::NotStarted,
                to: RunPhase::StreamsDraining,
            }
        );
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let mut t = PhaseTracker::new();
        t.advance(RunPhase::Running, None).unwrap();
        t.advance(RunPhase::Exited, None).unwrap();
        let err = t.advance(RunPhase::Running, None).unwrap_err();
        assert!(matches!(err, PhaseError::InvalidTransition { .. }));
    }

    #[test]
    fn same_phase_is_rejected() {
        let mut t = PhaseTracker::new();
        t.advance(RunPhase::Running, None).unwrap();
        let err = t.advance(RunPhase::Running, None).unwrap_err();
        assert_eq!(err, PhaseError::AlreadyInPhase(RunPhase::Running));
    }

    #[test]
    fn history_records_reasons() {
        let mut t = PhaseTracker::new();
        t.advance(RunPhase::Running, Some("spawned pid 42".into()))
            .unwrap();
        t.advance(RunPhase::CleanedUp, Some("consumer dropped".into()))
            .unwrap();

        let history = t.history();
        assert_eq!(history[0].from, RunPhase::NotStarted);
        assert_eq!(history[0].to, RunPhase::Running);
        assert_eq!(history[0].reason.as_deref(), Some("spawned pid 42"));
        assert_eq!(history[1].reason.as_deref(), Some("consumer dropped"));
    }

    #[test]
    fn running_time_only_after_spawn() {
        let mut t = PhaseTracker::new();
        assert!(t.running_time().is_none());
        t.advance(RunPhase::Running, None).unwrap();
        assert!(t.running_time().is_some());
    }

    #[test]
    fn phase_display_names() {
        assert_eq!(RunPhase::NotStarted.to_string(), "not_started");
        assert_eq!(RunPhase::StreamsDraining.to_string(), "streams_draining");
        assert_eq!(RunPhase::CleanedUp.to_string(), "cleaned_up");
    }

    #[test]
    fn phase_serde_names() {
        let json = serde_json::to_string(&RunPhase::StreamsDraining).unwrap();
        assert_eq!(json, r#""streams_draining""#);
    }
}
