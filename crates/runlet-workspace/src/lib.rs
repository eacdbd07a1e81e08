// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace file helpers: guarded text IO under a root, README lookup,
//! directory scanning, and repository cloning.
//!
//! These serve collaborators of the execution engine that need light
//! filesystem access without being handed arbitrary paths: relative
//! paths are validated against a workspace root and can never escape
//! it, not even through symlinks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod files;
pub mod repo;
pub mod scan;

pub use files::{find_readme, read_text_file, write_text_file, README_CANDIDATES};
pub use repo::{clone_repository, clone_with_timeout, CloneOutcome, CLONE_TIMEOUT};
pub use scan::{scan_directory, ScanReport};

use std::path::PathBuf;

/// Errors from workspace file operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The supposedly relative path is absolute.
    #[error("absolute paths are not allowed: {path}")]
    AbsolutePath {
        /// The offending path.
        path: PathBuf,
    },

    /// The relative path resolves outside the workspace root.
    #[error("path escapes the workspace root: {path}")]
    OutsideRoot {
        /// The offending path.
        path: PathBuf,
    },

    /// An underlying filesystem operation failed.
    #[error("{action} {path}")]
    Io {
        /// What was being attempted.
        action: &'static str,
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A directory walk failed partway.
    #[error("walk {path}")]
    Walk {
        /// The walk root.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: walkdir::Error,
    },
}
