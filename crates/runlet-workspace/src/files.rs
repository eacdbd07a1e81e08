// SPDX-License-Identifier: MIT OR Apache-2.0
//! Root-guarded text file access and README lookup.
//!
//! Relative paths are rejected if they are absolute or contain `..`
//! components, and the resolved location is verified to sit under the
//! root after symlink resolution. Reads are lossy UTF-8, matching the
//! engine's output decoding policy.

use crate::WorkspaceError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// README file names probed by [`find_readme`], in preference order.
pub const README_CANDIDATES: &[&str] = &[
    "README.md",
    "readme.md",
    "README.rst",
    "README.txt",
    "README",
    "ReadMe.md",
];

/// Read a text file under `root`, decoding lossily.
///
/// # Errors
///
/// Rejects absolute paths, `..` components, and resolutions escaping
/// `root`; filesystem failures surface as [`WorkspaceError::Io`].
pub fn read_text_file(root: &Path, rel: &Path) -> Result<String, WorkspaceError> {
    let path = resolve_under(root, rel)?;

    let resolved = path.canonicalize().map_err(|source| WorkspaceError::Io {
        action: "read",
        path: path.clone(),
        source,
    })?;
    ensure_within(root, &resolved)?;

    let bytes = fs::read(&resolved).map_err(|source| WorkspaceError::Io {
        action: "read",
        path: resolved.clone(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write `content` to a text file under `root`, creating parent
/// directories as needed. Returns the number of bytes written.
///
/// # Errors
///
/// Same traversal guard as [`read_text_file`]; filesystem failures
/// surface as [`WorkspaceError::Io`].
pub fn write_text_file(root: &Path, rel: &Path, content: &str) -> Result<u64, WorkspaceError> {
    let path = resolve_under(root, rel)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
            action: "create directory",
            path: parent.to_path_buf(),
            source,
        })?;
        // The parent exists now, so symlink games can be caught before
        // anything is written.
        let resolved = parent.canonicalize().map_err(|source| WorkspaceError::Io {
            action: "resolve",
            path: parent.to_path_buf(),
            source,
        })?;
        ensure_within(root, &resolved)?;
    }

    fs::write(&path, content).map_err(|source| WorkspaceError::Io {
        action: "write",
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), bytes = content.len(), "text file written");
    Ok(content.len() as u64)
}

/// First existing README in `dir`, probing [`README_CANDIDATES`] in
/// order.
#[must_use]
pub fn find_readme(dir: &Path) -> Option<PathBuf> {
    README_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Join `rel` onto `root` after the lexical traversal checks.
fn resolve_under(root: &Path, rel: &Path) -> Result<PathBuf, WorkspaceError> {
    if rel.is_absolute() {
        return Err(WorkspaceError::AbsolutePath {
            path: rel.to_path_buf(),
        });
    }
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(WorkspaceError::OutsideRoot {
            path: rel.to_path_buf(),
        });
    }
    Ok(root.join(rel))
}

/// Verify an already canonicalized path sits under `root`.
fn ensure_within(root: &Path, resolved: &Path) -> Result<(), WorkspaceError> {
    let root = root.canonicalize().map_err(|source| WorkspaceError::Io {
        action: "resolve",
        path: root.to_path_buf(),
        source,
    })?;
    if resolved.starts_with(&root) {
        Ok(())
    } else {
        Err(WorkspaceError::OutsideRoot {
            path: resolved.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_rejected_lexically() {
        let rel = if cfg!(windows) {
            Path::new(r"C:\evil")
        } else {
            Path::new("/etc/passwd")
        };
        let err = resolve_under(Path::new("root"), rel).unwrap_err();
        assert!(matches!(err, WorkspaceError::AbsolutePath { .. }));
    }

    #[test]
    fn parent_components_are_rejected_lexically() {
        let err = resolve_under(Path::new("root"), Path::new("a/../../b")).unwrap_err();
        assert!(matches!(err, WorkspaceError::OutsideRoot { .. }));
    }

    #[test]
    fn plain_relative_paths_join() {
        let path = resolve_under(Path::new("root"), Path::new("sub/file.txt")).unwrap();
        assert_eq!(path, Path::new("root").join("sub/file.txt"));
    }
}
