// SPDX-License-Identifier: MIT OR Apache-2.0
//! Execution planning: from a command specification to a spawnable
//! invocation.
//!
//! Planning is pure. The builder reads the manager layout and resolved
//! environment it is given and never touches the filesystem; wrapper
//! scripts are recorded as a body to materialize at spawn time.

use crate::classify::{CommandKind, classify};
use runlet_core::{CommandSpec, EngineError, ErrorCode, Platform};
use runlet_env::{CondaLayout, ResolvedEnv};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Shell prefix hosting manager invocations on Windows. `/D` skips
/// AutoRun commands, `/C` runs the command line and exits.
pub const CMD_WRAPPER: &[&str] = &["cmd.exe", "/D", "/C"];

/// Where a wrapper script is materialized before spawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempScriptPolicy {
    /// In the run's working directory, so relative references inside the
    /// script resolve where the user expects.
    #[default]
    Colocated,
    /// In the system temp directory.
    SystemTemp,
}

/// The exact way the child is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Invocation {
    /// Spawn `argv` as-is, program first.
    Direct {
        /// Full argument vector.
        argv: Vec<String>,
    },
    /// Materialize `body` as a batch script and run it through
    /// [`CMD_WRAPPER`].
    Script {
        /// Script body with CRLF line endings.
        body: String,
    },
}

/// A fully resolved plan, ready to spawn.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// How the child is invoked.
    pub invocation: Invocation,
    /// Working directory for the child.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Environment the child runs under.
    pub env: ResolvedEnv,
    /// Classification of the original tokens.
    pub kind: CommandKind,
    /// Platform the plan targets.
    pub platform: Platform,
    /// Placement policy for the wrapper script, when one is used.
    pub script_policy: TempScriptPolicy,
}

impl ExecutionPlan {
    /// One-line rendering of the invocation for logs and previews.
    #[must_use]
    pub fn display_line(&self) -> String {
        match &self.invocation {
            Invocation::Direct { argv } => {
                if self.platform.is_windows() {
                    join_cmdline(argv)
                } else {
                    shell_words::join(argv)
                }
            }
            // The third script line carries the actual command.
            Invocation::Script { body } => body
                .lines()
                .nth(2)
                .unwrap_or("activation wrapper")
                .to_string(),
        }
    }

    /// `true` when spawning requires a wrapper script on disk.
    #[must_use]
    pub fn needs_script(&self) -> bool {
        matches!(self.invocation, Invocation::Script { .. })
    }

    /// `true` when the child is dispatched through `cmd.exe` rather than
    /// spawned directly.
    #[must_use]
    pub fn via_shell(&self) -> bool {
        match &self.invocation {
            Invocation::Script { .. } => true,
            Invocation::Direct { argv } => {
                argv.len() > CMD_WRAPPER.len()
                    && argv
                        .iter()
                        .map(String::as_str)
                        .take(CMD_WRAPPER.len())
                        .eq(CMD_WRAPPER.iter().copied())
            }
        }
    }

    /// Inspection snapshot of the plan, without spawning anything.
    #[must_use]
    pub fn view(&self) -> PlanView {
        let script_preview = match &self.invocation {
            Invocation::Script { body } => Some(preview(body)),
            Invocation::Direct { .. } => None,
        };
        PlanView {
            command: self.display_line(),
            kind: self.kind,
            platform: self.platform,
            via_shell: self.via_shell(),
            script: self.needs_script(),
            script_preview,
            cwd: self.cwd.clone(),
            env_keys: self.env.keys().cloned().collect(),
        }
    }
}

/// What a plan would do, rendered for inspection.
///
/// Environment values are withheld on purpose; only the variable names
/// are listed.
#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    /// One-line rendering of the command.
    pub command: String,
    /// Classification of the original tokens.
    pub kind: CommandKind,
    /// Platform the plan targets.
    pub platform: Platform,
    /// Whether dispatch goes through `cmd.exe`.
    pub via_shell: bool,
    /// Whether a wrapper script is materialized before spawn.
    pub script: bool,
    /// Leading portion of the wrapper script body, when one is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_preview: Option<String>,
    /// Working directory for the child.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Names of the variables the child will see.
    pub env_keys: Vec<String>,
}

/// Builds [`ExecutionPlan`]s for one target platform.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    platform: Platform,
    script_policy: TempScriptPolicy,
}

impl PlanBuilder {
    /// Builder targeting `platform`.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            script_policy: TempScriptPolicy::default(),
        }
    }

    /// Override where wrapper scripts are placed.
    #[must_use]
    pub fn script_policy(mut self, policy: TempScriptPolicy) -> Self {
        self.script_policy = policy;
        self
    }

    /// Resolve `spec` into a plan under the given layout and child
    /// environment.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidCommand`] when the specification is empty or
    /// unparseable, and [`ErrorCode::ManagerNotFound`] for a Windows
    /// manager invocation with no discovered dispatch executable.
    pub fn build(
        &self,
        spec: &CommandSpec,
        layout: &CondaLayout,
        env: ResolvedEnv,
    ) -> Result<ExecutionPlan, EngineError> {
        let mut argv = spec.to_argv()?;
        let kind = classify(&argv, layout, self.platform);

        let invocation = if !kind.is_manager() {
            Invocation::Direct { argv }
        } else if !self.platform.is_windows() {
            // Once the bare name points at the discovered binary the
            // manager dispatches fine as a plain process. With nothing
            // discovered the name is left for PATH to resolve at spawn.
            if let Some(exe) = &layout.exe {
                argv[0] = exe.display().to_string();
            }
            Invocation::Direct { argv }
        } else {
            let Some(exe) = &layout.exe else {
                return Err(EngineError::new(
                    ErrorCode::ManagerNotFound,
                    "conda.bat was not found; cannot execute environment-manager commands",
                )
                .with_context("command", spec.display_line()));
            };
            argv[0] = exe.display().to_string();

            if kind == CommandKind::ManagerRun {
                // `conda run` manages activation itself.
                Invocation::Direct {
                    argv: wrap_in_shell(&argv),
                }
            } else if let Some(activate) = &layout.activate_script {
                Invocation::Script {
                    body: activation_script(activate, layout.root.as_deref(), &argv),
                }
            } else {
                warn!("activate.bat not found; running manager command without activation");
                Invocation::Direct {
                    argv: wrap_in_shell(&argv),
                }
            }
        };

        Ok(ExecutionPlan {
            invocation,
            cwd: spec.cwd.clone(),
            env,
            kind,
            platform: self.platform,
            script_policy: self.script_policy,
        })
    }
}

fn wrap_in_shell(argv: &[String]) -> Vec<String> {
    CMD_WRAPPER
        .iter()
        .map(|token| (*token).to_string())
        .chain(argv.iter().cloned())
        .collect()
}

const PREVIEW_LIMIT: usize = 160;

fn preview(body: &str) -> String {
    let mut out: String = body.chars().take(PREVIEW_LIMIT).collect();
    if out.len() < body.len() {
        out.push('…');
    }
    out
}

/// Batch wrapper that activates the base environment before dispatching.
///
/// `EXIT /B %ERRORLEVEL%` propagates the inner command's exit code
/// through `cmd.exe`.
fn activation_script(activate: &Path, root: Option<&Path>, argv: &[String]) -> String {
    let mut body = String::from("@echo off\r\n");
    match root {
        Some(root) => body.push_str(&format!(
            "CALL \"{}\" \"{}\"\r\n",
            activate.display(),
            root.display()
        )),
        None => body.push_str(&format!("CALL \"{}\"\r\n", activate.display())),
    }
    body.push_str(&join_cmdline(argv));
    body.push_str("\r\nEXIT /B %ERRORLEVEL%\r\n");
    body
}

/// Join an argument vector under the Windows cmdline quoting rules.
///
/// An argument is quoted when empty or containing a space or tab;
/// backslashes double only when they precede a quote; a literal quote is
/// escaped with a backslash.
#[must_use]
pub fn join_cmdline(argv: &[String]) -> String {
    let mut out = String::new();
    for arg in argv {
        if !out.is_empty() {
            out.push(' ');
        }
        let needs_quote = arg.is_empty() || arg.contains(' ') || arg.contains('\t');
        if needs_quote {
            out.push('"');
        }
        let mut backslashes = 0usize;
        for c in arg.chars() {
            match c {
                '\\' => backslashes += 1,
                '"' => {
                    out.push_str(&"\\".repeat(backslashes * 2 + 1));
                    out.push('"');
                    backslashes = 0;
                }
                _ => {
                    out.push_str(&"\\".repeat(backslashes));
                    backslashes = 0;
                    out.push(c);
                }
            }
        }
        out.push_str(&"\\".repeat(backslashes));
        if needs_quote {
            // Trailing backslashes double so they cannot escape the
            // closing quote.
            out.push_str(&"\\".repeat(backslashes));
            out.push('"');
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
