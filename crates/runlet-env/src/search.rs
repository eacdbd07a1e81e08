// SPDX-License-Identifier: MIT OR Apache-2.0
//! PATH probing for the environment-manager executable.

use runlet_core::Platform;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Executable names probed on the search path, in preference order.
#[must_use]
pub fn manager_names(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => &["conda.bat", "conda.exe"],
        Platform::Posix => &["conda"],
    }
}

/// Locate `name` the way a shell would.
///
/// A name containing a path separator is treated as a direct path and
/// only checked for existence. Otherwise every directory in `PATH` is
/// probed; on Windows the usual executable extensions are tried as well.
#[must_use]
pub fn which(name: &str, platform: Platform) -> Option<PathBuf> {
    if Path::new(name).components().count() > 1 {
        let path = PathBuf::from(name);
        return path.is_file().then_some(path);
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| resolve_in_dir(&dir, name, platform))
}

fn resolve_in_dir(dir: &Path, name: &str, platform: Platform) -> Option<PathBuf> {
    let suffixes: &[&str] = if platform.is_windows() {
        &["", ".exe", ".cmd", ".bat", ".com"]
    } else {
        &[""]
    };
    suffixes
        .iter()
        .map(|suffix| dir.join(format!("{name}{suffix}")))
        .find(|candidate| candidate.is_file())
}

/// Find the manager executable, preferring an explicit override.
///
/// An override pointing at a missing file is ignored with a warning so a
/// stale `CONDA_EXE` cannot mask a working PATH installation.
#[must_use]
pub fn find_manager_exe(platform: Platform, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!(path = %path.display(), "configured manager executable does not exist; falling back to PATH");
    }

    manager_names(platform)
        .iter()
        .find_map(|name| which(name, platform))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn direct_path_bypasses_path_search() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("conda");
        fs::write(&exe, "#!/bin/sh\n").unwrap();

        let found = which(exe.to_str().unwrap(), Platform::Posix);
        assert_eq!(found.as_deref(), Some(exe.as_path()));
    }

    #[test]
    fn direct_path_to_missing_file_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("missing").join("conda");
        assert!(which(exe.to_str().unwrap(), Platform::Posix).is_none());
    }

    #[test]
    fn windows_probing_appends_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("tool.bat");
        fs::write(&exe, "@echo off\r\n").unwrap();

        let found = resolve_in_dir(tmp.path(), "tool", Platform::Windows);
        assert_eq!(found.as_deref(), Some(exe.as_path()));
    }

    #[test]
    fn posix_probing_takes_names_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("tool.exe"), "").unwrap();

        assert!(resolve_in_dir(tmp.path(), "tool", Platform::Posix).is_none());
        fs::write(tmp.path().join("tool"), "").unwrap();
        assert!(resolve_in_dir(tmp.path(), "tool", Platform::Posix).is_some());
    }

    #[test]
    fn valid_override_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("my-conda");
        fs::write(&exe, "").unwrap();

        let found = find_manager_exe(Platform::Posix, Some(&exe));
        assert_eq!(found.as_deref(), Some(exe.as_path()));
    }

    #[test]
    fn stale_override_falls_back_to_path_search() {
        let tmp = tempfile::tempdir().unwrap();
        let ghost = tmp.path().join("gone");
        // No PATH entry carries a conda in the test environment, so the
        // fallback search comes up empty rather than erroring.
        let found = find_manager_exe(Platform::Posix, Some(&ghost));
        assert!(found.is_none() || found.unwrap() != ghost);
    }

    #[test]
    fn manager_names_differ_by_platform() {
        assert_eq!(manager_names(Platform::Windows), ["conda.bat", "conda.exe"]);
        assert_eq!(manager_names(Platform::Posix), ["conda"]);
    }
}
