// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command specification accepted by the engine.
//!
//! A command arrives either as one shell-syntax line or as a pre-split
//! argument vector, plus an optional working directory. Splitting uses
//! POSIX quoting rules on every platform; callers needing exact Windows
//! tokenisation pass the argv form. An empty or unparseable spec is a
//! terminal error, never silently ignored.

use crate::error::{EngineError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw command input: a shell-syntax line or a pre-split vector.
///
/// Serialises untagged, so `"echo hi"` and `["echo", "hi"]` both
/// deserialise naturally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    /// A single shell-syntax line, split with POSIX quoting rules.
    Line(String),
    /// An already-split argument vector, used verbatim.
    Argv(Vec<String>),
}

/// A command to execute plus its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The command itself.
    pub input: CommandInput,
    /// Working directory for the child; the caller's current directory
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Spec from a shell-syntax line.
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            input: CommandInput::Line(line.into()),
            cwd: None,
        }
    }

    /// Spec from a pre-split argument vector.
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: CommandInput::Argv(args.into_iter().map(Into::into).collect()),
            cwd: None,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Resolve to a non-empty argument vector.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::InvalidCommand`] when the line does not parse
    /// (unbalanced quoting) or the result is empty.
    pub fn to_argv(&self) -> Result<Vec<String>, EngineError> {
        let argv = match &self.input {
            CommandInput::Line(line) => shell_words::split(line).map_err(|e| {
                EngineError::new(ErrorCode::InvalidCommand, "command line does not parse")
                    .with_context("line", line)
                    .with_source(e)
            })?,
            CommandInput::Argv(argv) => argv.clone(),
        };

        if argv.is_empty() {
            return Err(EngineError::new(
                ErrorCode::InvalidCommand,
                "empty command specification",
            ));
        }
        Ok(argv)
    }

    /// Single-line rendering for logs and summaries.
    #[must_use]
    pub fn display_line(&self) -> String {
        match &self.input {
            CommandInput::Line(line) => line.clone(),
            CommandInput::Argv(argv) => shell_words::join(argv),
        }
    }
}

impl From<&str> for CommandSpec {
    fn from(line: &str) -> Self {
        Self::line(line)
    }
}

impl From<Vec<String>> for CommandSpec {
    fn from(argv: Vec<String>) -> Self {
        Self {
            input: CommandInput::Argv(argv),
            cwd: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_splits_on_whitespace() {
        let spec = CommandSpec::line("echo hello world");
        assert_eq!(spec.to_argv().unwrap(), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn line_respects_quoting() {
        let spec = CommandSpec::line(r#"python -c "print('hi there')""#);
        assert_eq!(
            spec.to_argv().unwrap(),
            vec!["python", "-c", "print('hi there')"]
        );
    }

    #[test]
    fn argv_passes_through_verbatim() {
        let spec = CommandSpec::argv(["conda", "run", "-n", "base", "python"]);
        assert_eq!(
            spec.to_argv().unwrap(),
            vec!["conda", "run", "-n", "base", "python"]
        );
    }

    #[test]
    fn unbalanced_quote_is_invalid_command() {
        let spec = CommandSpec::line(r#"echo "unterminated"#);
        let err = spec.to_argv().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCommand);
        assert!(err.source.is_some());
    }

    #[test]
    fn empty_line_is_invalid_command() {
        let err = CommandSpec::line("").to_argv().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCommand);
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn whitespace_only_line_is_invalid_command() {
        let err = CommandSpec::line("   \t ").to_argv().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCommand);
    }

    #[test]
    fn empty_argv_is_invalid_command() {
        let err = CommandSpec::argv(Vec::<String>::new()).to_argv().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCommand);
    }

    #[test]
    fn cwd_builder() {
        let spec = CommandSpec::line("ls").with_cwd("/tmp");
        assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn untagged_serde_accepts_both_shapes() {
        let from_line: CommandSpec =
            serde_json::from_str(r#"{"input": "echo hi"}"#).unwrap();
        assert_eq!(from_line.input, CommandInput::Line("echo hi".into()));

        let from_argv: CommandSpec =
            serde_json::from_str(r#"{"input": ["echo", "hi"], "cwd": "/work"}"#).unwrap();
        assert_eq!(
            from_argv.input,
            CommandInput::Argv(vec!["echo".into(), "hi".into()])
        );
        assert_eq!(from_argv.cwd.as_deref(), Some(std::path::Path::new("/work")));
    }

    #[test]
    fn display_line_joins_argv_with_quoting() {
        let spec = CommandSpec::argv(["echo", "two words"]);
        assert_eq!(spec.display_line(), "echo 'two words'");
    }
}
