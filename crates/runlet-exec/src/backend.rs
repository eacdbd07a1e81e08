// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pump backends: strategies for draining child output pipes.

use async_trait::async_trait;
use runlet_core::{Platform, StreamSource};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tracing::warn;

use crate::backend_select::MultiplexedBackend;
use crate::backend_tasks::TaskPerStreamBackend;

/// Environment variable overriding the pump backend (`tasks` | `select`).
pub const BACKEND_ENV: &str = "RUNLET_BACKEND";

/// Raw bytes pulled off one of the child's pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawChunk {
    /// Bytes read from `source`, in arrival order.
    Data {
        /// Which pipe the bytes came from.
        source: StreamSource,
        /// The bytes, possibly ending mid UTF-8 sequence.
        bytes: Vec<u8>,
    },
    /// `source` reached end of stream. Sent exactly once per stream.
    Eof {
        /// Which pipe finished.
        source: StreamSource,
    },
}

impl RawChunk {
    /// The stream this chunk belongs to.
    #[must_use]
    pub fn source(&self) -> StreamSource {
        match self {
            Self::Data { source, .. } | Self::Eof { source } => *source,
        }
    }
}

/// Output pipes taken out of the spawned child.
///
/// Taking the pipes up front leaves the `Child` free for liveness checks
/// and the authoritative `wait`.
pub struct ChildStreams {
    /// The child's stdout pipe.
    pub stdout: ChildStdout,
    /// The child's stderr pipe.
    pub stderr: ChildStderr,
}

/// Tuning knobs shared by the pump backends.
#[derive(Debug, Clone, Copy)]
pub struct PumpOptions {
    /// Largest single read from a pipe.
    pub chunk_size: usize,
    /// How long to wait on quiet pipes before re-checking liveness.
    pub poll_interval: Duration,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// A strategy for moving child output into the chunk channel.
///
/// Implementations must emit `Data` chunks in per-stream order, send
/// exactly one [`RawChunk::Eof`] per stream, and return once both
/// streams are exhausted. They may check liveness with `try_wait` but
/// must not perform the authoritative `wait`; that stays with the
/// runner.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// Which strategy this is.
    fn kind(&self) -> BackendKind;

    /// Drain both pipes to exhaustion.
    async fn pump(
        &self,
        child: &mut Child,
        io: ChildStreams,
        tx: mpsc::Sender<RawChunk>,
        opts: PumpOptions,
    ) -> io::Result<()>;
}

/// Available pump strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// One reader task per pipe; the Windows default.
    TaskPerStream,
    /// A single task multiplexing both pipes; the POSIX default.
    Multiplexed,
}

impl BackendKind {
    /// Default strategy for `platform`.
    #[must_use]
    pub fn platform_default(platform: Platform) -> Self {
        match platform {
            Platform::Windows => Self::TaskPerStream,
            Platform::Posix => Self::Multiplexed,
        }
    }

    /// Parse a backend token as used by [`BACKEND_ENV`].
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "tasks" => Some(Self::TaskPerStream),
            "select" => Some(Self::Multiplexed),
            _ => None,
        }
    }

    /// Token form, the inverse of [`BackendKind::from_token`].
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::TaskPerStream => "tasks",
            Self::Multiplexed => "select",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

/// Where a backend choice came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
    /// Explicitly requested by the caller.
    Requested,
    /// Taken from the [`BACKEND_ENV`] environment variable.
    Environment,
    /// Fell through to the platform default.
    PlatformDefault,
}

/// Outcome of backend negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendSelection {
    /// The strategy to use.
    pub kind: BackendKind,
    /// Why it was chosen.
    pub origin: SelectionOrigin,
}

/// Choose a pump backend.
///
/// Precedence: caller request, then [`BACKEND_ENV`], then the platform
/// default. Both strategies work on both platforms; an unrecognized
/// environment token is ignored with a warning.
#[must_use]
pub fn negotiate(platform: Platform, requested: Option<BackendKind>) -> BackendSelection {
    let env_token = std::env::var(BACKEND_ENV).ok();
    negotiate_with(platform, requested, env_token.as_deref())
}

fn negotiate_with(
    platform: Platform,
    requested: Option<BackendKind>,
    env_token: Option<&str>,
) -> BackendSelection {
    if let Some(kind) = requested {
        return BackendSelection {
            kind,
            origin: SelectionOrigin::Requested,
        };
    }

    if let Some(raw) = env_token {
        if let Some(kind) = BackendKind::from_token(raw) {
            return BackendSelection {
                kind,
                origin: SelectionOrigin::Environment,
            };
        }
        if !raw.trim().is_empty() {
            warn!(value = %raw, "unrecognized RUNLET_BACKEND value; using platform default");
        }
    }

    BackendSelection {
        kind: BackendKind::platform_default(platform),
        origin: SelectionOrigin::PlatformDefault,
    }
}

/// Instantiate the backend for `kind`.
#[must_use]
pub fn backend_for(kind: BackendKind) -> Box<dyn StreamBackend> {
    match kind {
        BackendKind::TaskPerStream => Box::new(TaskPerStreamBackend),
        BackendKind::Multiplexed => Box::new(MultiplexedBackend),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
