// SPDX-License-Identifier: MIT OR Apache-2.0
//! Directory tree scanning with relative, forward-slash paths.

use crate::WorkspaceError;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Component, Path};
use walkdir::WalkDir;

/// Serializable listing of a directory tree.
///
/// Paths are relative to `base_path` and use forward slashes on every
/// platform; both lists are sorted for deterministic output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// The directory that was scanned, as given.
    pub base_path: String,
    /// Relative paths of all regular files found.
    pub files: Vec<String>,
    /// Relative paths of all directories found.
    pub directories: Vec<String>,
}

/// Walk `dir` up to `max_depth` levels (`None` = unlimited), skipping
/// `.git`, and record the relative file and directory paths.
///
/// # Errors
///
/// [`WorkspaceError::Walk`] when an entry cannot be read.
pub fn scan_directory(dir: &Path, max_depth: Option<usize>) -> Result<ScanReport, WorkspaceError> {
    let mut walker = WalkDir::new(dir).follow_links(false).min_depth(1);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut files = Vec::new();
    let mut directories = Vec::new();
    for entry in walker
        .into_iter()
        .filter_entry(|e| e.file_name() != OsStr::new(".git"))
    {
        let entry = entry.map_err(|source| WorkspaceError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        if entry.file_type().is_dir() {
            directories.push(slashed(rel));
        } else if entry.file_type().is_file() {
            files.push(slashed(rel));
        }
    }

    files.sort();
    directories.sort();
    Ok(ScanReport {
        base_path: dir.display().to_string(),
        files,
        directories,
    })
}

/// Render a relative path with forward slashes regardless of platform.
fn slashed(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn slashed_joins_components_with_forward_slashes() {
        let path: PathBuf = ["a", "b", "c.txt"].iter().collect();
        assert_eq!(slashed(&path), "a/b/c.txt");
    }

    #[test]
    fn slashed_of_empty_path_is_empty() {
        assert_eq!(slashed(Path::new("")), "");
    }
}
