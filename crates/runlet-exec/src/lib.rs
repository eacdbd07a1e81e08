// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streaming external-process execution with environment-manager
//! awareness.
//!
//! [`Engine`] is the front door: it resolves the Conda-style manager
//! layout once, classifies and plans each command, spawns the child
//! under a restricted environment, and streams decoded output as
//! [`OutputEvent`](runlet_core::OutputEvent)s ending in exactly one
//! `return_code`. Failures before and during the run surface through
//! the same event stream, so a consumer only ever deals with one shape.
//!
//! ```no_run
//! use runlet_core::CommandSpec;
//! use runlet_exec::Engine;
//!
//! # async fn demo() {
//! let engine = Engine::new();
//! let log = engine.collect(&CommandSpec::line("python --version")).await;
//! println!("exited {:?}", log.return_code());
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod backend_select;
pub mod backend_tasks;
pub mod cancel;
pub mod classify;
pub mod guard;
pub mod plan;
pub mod runner;

pub use backend::{
    backend_for, negotiate, BackendKind, BackendSelection, ChildStreams, PumpOptions, RawChunk,
    SelectionOrigin, StreamBackend, BACKEND_ENV,
};
pub use backend_select::MultiplexedBackend;
pub use backend_tasks::TaskPerStreamBackend;
pub use cancel::{CancelReason, CancelToken};
pub use classify::{classify, CommandKind};
pub use guard::LifecycleGuard;
pub use plan::{
    join_cmdline, ExecutionPlan, Invocation, PlanBuilder, PlanView, TempScriptPolicy, CMD_WRAPPER,
};
pub use runner::ExecutionHandle;

use runlet_core::{CommandSpec, EngineError, EventLog, Platform};
use runlet_env::CondaResolver;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// ---------------------------------------------------------------------------
// ExecOptions
// ---------------------------------------------------------------------------

/// Tunables applied to every run started by one [`Engine`].
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Pump backend to use; `None` negotiates from the environment and
    /// the platform default.
    pub backend: Option<BackendKind>,
    /// Where wrapper scripts are materialized.
    pub script_policy: TempScriptPolicy,
    /// Largest single pipe read, in bytes.
    pub chunk_size: usize,
    /// Liveness poll interval while the pipes are quiet.
    pub poll_interval: Duration,
    /// Grace period for each step of the terminate-then-kill escalation.
    pub kill_grace: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        let pump = PumpOptions::default();
        Self {
            backend: None,
            script_policy: TempScriptPolicy::default(),
            chunk_size: pump.chunk_size,
            poll_interval: pump.poll_interval,
            kill_grace: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Plans and executes commands against one discovered manager layout.
///
/// The engine is cheap to clone-share behind an [`Arc`] and safe to use
/// from multiple tasks; the layout is discovered once and cached by the
/// resolver.
#[derive(Debug)]
pub struct Engine {
    resolver: Arc<CondaResolver>,
    options: ExecOptions,
}

impl Engine {
    /// Engine for the current platform with default options.
    ///
    /// Manager discovery honors the `CONDA_EXE` override and probes
    /// `PATH` lazily on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ExecOptions::default())
    }

    /// Engine for the current platform with explicit options.
    #[must_use]
    pub fn with_options(options: ExecOptions) -> Self {
        Self {
            resolver: Arc::new(CondaResolver::new(Platform::current())),
            options,
        }
    }

    /// Engine sharing an existing resolver.
    #[must_use]
    pub fn with_resolver(resolver: Arc<CondaResolver>, options: ExecOptions) -> Self {
        Self { resolver, options }
    }

    /// The resolver backing this engine.
    #[must_use]
    pub fn resolver(&self) -> &Arc<CondaResolver> {
        &self.resolver
    }

    /// Resolve `spec` into a plan without executing anything.
    ///
    /// # Errors
    ///
    /// The same planning errors [`Engine::execute`] converts into
    /// failure events: an invalid spec or a Windows manager invocation
    /// with no discovered dispatcher.
    pub fn plan(&self, spec: &CommandSpec) -> Result<ExecutionPlan, EngineError> {
        let layout = self.resolver.resolve();
        let env = self.resolver.restricted_env();
        PlanBuilder::new(self.resolver.platform())
            .script_policy(self.options.script_policy)
            .build(spec, &layout, env)
    }

    /// Execute `spec`, returning a handle onto the live event stream.
    ///
    /// This never returns an error: planning failures are replayed
    /// through the stream as a `stderr` event plus the code's reserved
    /// negative `return_code`, so consumers handle exactly one shape.
    /// Must be called from within a tokio runtime.
    pub fn execute(&self, spec: &CommandSpec) -> ExecutionHandle {
        match self.plan(spec) {
            Ok(plan) => runner::start(plan, &self.options),
            Err(error) => {
                debug!(%error, "planning failed; replaying as failure events");
                runner::failed(&error)
            }
        }
    }

    /// Execute `spec` and collect the whole run into an [`EventLog`].
    pub async fn collect(&self, spec: &CommandSpec) -> EventLog {
        self.execute(spec).collect().await
    }
}

impl Default for Engine {
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
    use runlet_env::DiscoveryOverrides;

    fn offline_engine() -> Engine {
        // An override pointing nowhere keeps discovery deterministic on
        // machines that have a real manager installed.
        let tmp = std::env::temp_dir().join("runlet-no-such-manager");
        Engine::with_resolver(
            Arc::new(CondaResolver::with_overrides(
                Platform::current(),
                DiscoveryOverrides {
                    explicit_exe: Some(tmp),
                },
            )),
            ExecOptions::default(),
        )
    }

    #[tokio::test]
    async fn empty_spec_yields_invalid_command_events() {
        let log = offline_engine().collect(&CommandSpec::line("   ")).await;
        assert_eq!(log.return_code(), Some(-1));
        assert!(log.stderr_text().contains("INVALID_COMMAND"));
    }

    #[tokio::test]
    async fn unparseable_line_yields_invalid_command_events() {
        let log = offline_engine()
            .collect(&CommandSpec::line(r#"echo "unterminated"#))
            .await;
        assert_eq!(log.return_code(), Some(-1));
    }

    #[test]
    fn plan_keeps_a_plain_command_direct() {
        let engine = offline_engine();
        let plan = engine
            .plan(&CommandSpec::argv(["echo", "hello"]))
            .expect("plain command plans");
        assert_eq!(plan.kind, CommandKind::Plain);
        assert!(!plan.needs_script());
    }

    #[test]
    fn options_default_matches_pump_defaults() {
        let options = ExecOptions::default();
        let pump = PumpOptions::default();
        assert_eq!(options.chunk_size, pump.chunk_size);
        assert_eq!(options.poll_interval, pump.poll_interval);
        assert_eq!(options.kill_grace, Duration::from_secs(1));
        assert!(options.backend.is_none());
    }
}
