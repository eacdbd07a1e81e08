// SPDX-License-Identifier: MIT OR Apache-2.0
//! Target platform selector for pure planning decisions.
//!
//! Launch planning and environment assembly differ between POSIX and
//! Windows, but both are decidable without touching the host OS. Passing
//! [`Platform`] explicitly keeps those code paths unit-testable from any
//! host; [`Platform::current`] supplies the real value at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The launch-planning target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Unix-like systems.
    Posix,
    /// Windows.
    Windows,
}

impl Platform {
    /// The platform this process is running on.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    /// `true` for [`Platform::Windows`].
    #[must_use]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Separator between entries of a `PATH`-style list.
    #[must_use]
    pub fn path_list_separator(self) -> char {
        match self {
            Self::Posix => ':',
            Self::Windows => ';',
        }
    }

    /// Comparison key for path equality and deduplication.
    ///
    /// Uniform forward slashes, no trailing slash, case-folded on Windows.
    /// Lexical only; does not resolve symlinks or `..`.
    #[must_use]
    pub fn path_key(self, path: &Path) -> String {
        let mut key = path.to_string_lossy().replace('\\', "/");
        while key.len() > 1 && key.ends_with('/') {
            key.pop();
        }
        if self.is_windows() {
            key.to_lowercase()
        } else {
            key
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_matches_cfg() {
        assert_eq!(Platform::current().is_windows(), cfg!(windows));
    }

    #[test]
    fn separators() {
        assert_eq!(Platform::Posix.path_list_separator(), ':');
        assert_eq!(Platform::Windows.path_list_separator(), ';');
    }

    #[test]
    fn windows_keys_fold_case_and_slashes() {
        let a = Platform::Windows.path_key(Path::new(r"C:\Conda\Scripts"));
        let b = Platform::Windows.path_key(Path::new("c:/conda/scripts/"));
        assert_eq!(a, b);
    }

    #[test]
    fn posix_keys_preserve_case() {
        let a = Platform::Posix.path_key(Path::new("/opt/Conda"));
        let b = Platform::Posix.path_key(Path::new("/opt/conda"));
        assert_ne!(a, b);
    }

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(
            Platform::Posix.path_key(Path::new("/usr/bin/")),
            "/usr/bin"
        );
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&Platform::Windows).unwrap(),
            r#""windows""#
        );
        assert_eq!(
            serde_json::to_string(&Platform::Posix).unwrap(),
            r#""posix""#
        );
    }
}
