// SPDX-License-Identifier: MIT OR Apache-2.0
//! Classification of raw command tokens.

use runlet_core::Platform;
use runlet_env::CondaLayout;
use serde::{Deserialize, Serialize};

/// How a command line relates to the environment manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Ordinary executable invocation.
    Plain,
    /// Manager invocation in any form other than `run`.
    Manager,
    /// `conda run ...`: the manager executes a command inside an
    /// environment and forwards its output.
    ManagerRun,
}

impl CommandKind {
    /// `true` for either manager form.
    #[must_use]
    pub fn is_manager(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Classify `argv` against the discovered manager layout.
///
/// Runs over the raw tokens, before any executable substitution: the
/// bare name `conda` matches case-insensitively, and anything else is
/// compared against the discovered dispatch executable under the
/// platform's path normalisation.
#[must_use]
pub fn classify(argv: &[String], layout: &CondaLayout, platform: Platform) -> CommandKind {
    let Some(first) = argv.first() else {
        return CommandKind::Plain;
    };

    let is_manager = first.eq_ignore_ascii_case("conda") || layout.is_manager_exe(first, platform);
    if !is_manager {
        return CommandKind::Plain;
    }

    match argv.get(1) {
        Some(second) if second.eq_ignore_ascii_case("run") => CommandKind::ManagerRun,
        _ => CommandKind::Manager,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn bare_conda_matches_any_case() {
        let layout = CondaLayout::empty();
        for name in ["conda", "CONDA", "Conda"] {
            let kind = classify(&argv(&[name, "env", "list"]), &layout, Platform::Posix);
            assert_eq!(kind, CommandKind::Manager, "{name}");
        }
    }

    #[test]
    fn other_executables_are_plain() {
        let layout = CondaLayout::empty();
        assert_eq!(
            classify(&argv(&["python", "app.py"]), &layout, Platform::Posix),
            CommandKind::Plain
        );
        assert_eq!(
            classify(&argv(&["condactl", "run"]), &layout, Platform::Posix),
            CommandKind::Plain
        );
    }

    #[test]
    fn run_form_detected_case_insensitively() {
        let layout = CondaLayout::empty();
        assert_eq!(
            classify(
                &argv(&["conda", "RUN", "-n", "base", "python"]),
                &layout,
                Platform::Posix
            ),
            CommandKind::ManagerRun
        );
    }

    #[test]
    fn run_must_be_the_literal_second_token() {
        let layout = CondaLayout::empty();
        assert_eq!(
            classify(&argv(&["conda", "runs"]), &layout, Platform::Posix),
            CommandKind::Manager
        );
        assert_eq!(
            classify(&argv(&["conda"]), &layout, Platform::Posix),
            CommandKind::Manager
        );
    }

    #[test]
    fn discovered_path_matches_under_windows_normalisation() {
        let layout = CondaLayout {
            exe: Some(PathBuf::from(r"C:\Conda\condabin\conda.bat")),
            ..CondaLayout::default()
        };
        let kind = classify(
            &argv(&[r"c:\conda\CONDABIN\conda.bat", "info"]),
            &layout,
            Platform::Windows,
        );
        assert_eq!(kind, CommandKind::Manager);
    }

    #[test]
    fn path_match_requires_a_discovered_exe() {
        let layout = CondaLayout::empty();
        assert_eq!(
            classify(
                &argv(&["/opt/conda/bin/conda", "info"]),
                &layout,
                Platform::Posix
            ),
            CommandKind::Plain
        );
    }

    #[test]
    fn empty_argv_is_plain() {
        let layout = CondaLayout::empty();
        assert_eq!(classify(&[], &layout, Platform::Posix), CommandKind::Plain);
    }

    #[test]
    fn run_implies_manager() {
        assert!(CommandKind::ManagerRun.is_manager());
        assert!(CommandKind::Manager.is_manager());
        assert!(!CommandKind::Plain.is_manager());
    }
}
