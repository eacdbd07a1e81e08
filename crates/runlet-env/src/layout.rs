// SPDX-License-Identifier: MIT OR Apache-2.0
//! On-disk shape of a Conda installation.
//!
//! Discovery is best-effort by design: any subset of the fields may be
//! known, and an empty layout is valid. Callers that strictly need the
//! manager fail at plan time, not here.

use runlet_core::Platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths discovered for a Conda installation.
///
/// `exe` is the dispatch executable a manager invocation is substituted
/// with: `conda.bat` on Windows, the `conda` binary on POSIX.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondaLayout {
    /// Dispatch executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe: Option<PathBuf>,
    /// Installation root (the directory containing `conda-meta`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// `<root>/Scripts`, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
    /// `<root>/condabin`, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condabin_dir: Option<PathBuf>,
    /// `<root>/Library/bin`, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_bin_dir: Option<PathBuf>,
    /// `activate.bat` entry point (Windows only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activate_script: Option<PathBuf>,
}

impl CondaLayout {
    /// A layout with nothing discovered.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// `true` when no path at all was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Infer the installation structure around a discovered executable.
    ///
    /// The grandparent of the executable is the installation root iff it
    /// contains the `conda-meta` marker; standard subdirectories are then
    /// recorded when they exist on disk. Without the marker, an executable
    /// sitting in a directory named `condabin` or `Scripts` still gets that
    /// directory recorded, with the root left unknown.
    #[must_use]
    pub fn infer_from_exe(exe: &Path, platform: Platform) -> Self {
        let mut layout = Self {
            exe: Some(exe.to_path_buf()),
            ..Self::default()
        };

        let Some(exe_dir) = exe.parent() else {
            return layout;
        };

        match exe_dir.parent() {
            Some(grandparent) if grandparent.join("conda-meta").exists() => {
                layout.root = Some(grandparent.to_path_buf());

                let scripts = grandparent.join("Scripts");
                if scripts.is_dir() {
                    layout.scripts_dir = Some(scripts);
                }
                let condabin = grandparent.join("condabin");
                if condabin.is_dir() {
                    layout.condabin_dir = Some(condabin);
                }
                let library_bin = grandparent.join("Library").join("bin");
                if library_bin.is_dir() {
                    layout.library_bin_dir = Some(library_bin);
                }

                if platform.is_windows() {
                    layout.activate_script = first_file(
                        layout.condabin_dir.as_deref(),
                        layout.scripts_dir.as_deref(),
                        "activate.bat",
                    );
                    // Prefer the canonical conda.bat over whatever PATH
                    // happened to resolve.
                    if let Some(canonical) = first_file(
                        layout.condabin_dir.as_deref(),
                        layout.scripts_dir.as_deref(),
                        "conda.bat",
                    ) {
                        layout.exe = Some(canonical);
                    }
                }
            }
            _ => {
                let dir_name = exe_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_lowercase());
                match dir_name.as_deref() {
                    Some("condabin") => layout.condabin_dir = Some(exe_dir.to_path_buf()),
                    Some("scripts") => layout.scripts_dir = Some(exe_dir.to_path_buf()),
                    _ => {}
                }
            }
        }

        layout
    }

    /// `true` if `candidate` names the discovered dispatch executable,
    /// compared under the platform's path normalisation.
    #[must_use]
    pub fn is_manager_exe(&self, candidate: &str, platform: Platform) -> bool {
        self.exe
            .as_deref()
            .is_some_and(|exe| platform.path_key(Path::new(candidate)) == platform.path_key(exe))
    }
}

fn first_file(primary: Option<&Path>, fallback: Option<&Path>, name: &str) -> Option<PathBuf> {
    [primary, fallback]
        .into_iter()
        .flatten()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Build `<root>/{conda-meta,Scripts,condabin,Library/bin}` with the
    /// conventional Windows batch entry points inside.
    fn fake_install(root: &Path) {
        fs::create_dir_all(root.join("conda-meta")).unwrap();
        fs::create_dir_all(root.join("Scripts")).unwrap();
        fs::create_dir_all(root.join("condabin")).unwrap();
        fs::create_dir_all(root.join("Library").join("bin")).unwrap();
        fs::write(root.join("condabin").join("conda.bat"), "@echo off\r\n").unwrap();
        fs::write(root.join("condabin").join("activate.bat"), "@echo off\r\n").unwrap();
        fs::write(root.join("Scripts").join("conda.exe"), "").unwrap();
    }

    #[test]
    fn marker_directory_fixes_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("miniconda3");
        fake_install(&root);

        let exe = root.join("Scripts").join("conda.exe");
        let layout = CondaLayout::infer_from_exe(&exe, Platform::Windows);

        assert_eq!(layout.root.as_deref(), Some(root.as_path()));
        assert_eq!(layout.scripts_dir.as_deref(), Some(root.join("Scripts").as_path()));
        assert_eq!(
            layout.condabin_dir.as_deref(),
            Some(root.join("condabin").as_path())
        );
        assert_eq!(
            layout.library_bin_dir.as_deref(),
            Some(root.join("Library").join("bin").as_path())
        );
    }

    #[test]
    fn condabin_activate_preferred_over_scripts() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("conda");
        fake_install(&root);
        fs::write(root.join("Scripts").join("activate.bat"), "@echo off\r\n").unwrap();

        let exe = root.join("Scripts").join("conda.exe");
        let layout = CondaLayout::infer_from_exe(&exe, Platform::Windows);

        assert_eq!(
            layout.activate_script.as_deref(),
            Some(root.join("condabin").join("activate.bat").as_path())
        );
    }

    #[test]
    fn windows_exe_upgraded_to_canonical_conda_bat() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("conda");
        fake_install(&root);

        let exe = root.join("Scripts").join("conda.exe");
        let layout = CondaLayout::infer_from_exe(&exe, Platform::Windows);

        assert_eq!(
            layout.exe.as_deref(),
            Some(root.join("condabin").join("conda.bat").as_path())
        );
    }

    #[test]
    fn posix_keeps_discovered_exe() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("miniconda3");
        fs::create_dir_all(root.join("conda-meta")).unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin").join("conda"), "#!/bin/sh\n").unwrap();

        let exe = root.join("bin").join("conda");
        let layout = CondaLayout::infer_from_exe(&exe, Platform::Posix);

        assert_eq!(layout.exe.as_deref(), Some(exe.as_path()));
        assert_eq!(layout.root.as_deref(), Some(root.as_path()));
        assert!(layout.activate_script.is_none());
    }

    #[test]
    fn no_marker_records_subdir_by_name_only() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("condabin");
        fs::create_dir_all(&dir).unwrap();
        let exe = dir.join("conda.bat");
        fs::write(&exe, "@echo off\r\n").unwrap();

        let layout = CondaLayout::infer_from_exe(&exe, Platform::Windows);
        assert!(layout.root.is_none());
        assert_eq!(layout.condabin_dir.as_deref(), Some(dir.as_path()));
    }

    #[test]
    fn unrelated_directory_yields_exe_only() {
        let tmp = tempfile::tempdir().unwrap();
        let exe = tmp.path().join("somewhere").join("conda");
        fs::create_dir_all(exe.parent().unwrap()).unwrap();
        fs::write(&exe, "").unwrap();

        let layout = CondaLayout::infer_from_exe(&exe, Platform::Posix);
        assert_eq!(layout.exe.as_deref(), Some(exe.as_path()));
        assert!(layout.root.is_none());
        assert!(layout.scripts_dir.is_none());
        assert!(layout.condabin_dir.is_none());
    }

    #[test]
    fn manager_exe_matching_is_case_insensitive_on_windows() {
        let layout = CondaLayout {
            exe: Some(PathBuf::from(r"C:\Conda\condabin\conda.bat")),
            ..CondaLayout::default()
        };
        assert!(layout.is_manager_exe(r"c:\conda\CONDABIN\conda.bat", Platform::Windows));
        assert!(!layout.is_manager_exe(r"c:\other\conda.bat", Platform::Windows));
    }

    #[test]
    fn empty_layout_reports_empty() {
        assert!(CondaLayout::empty().is_empty());
        let layout = CondaLayout {
            root: Some(PathBuf::from("/opt/conda")),
            ..CondaLayout::default()
        };
        assert!(!layout.is_empty());
    }

    #[test]
    fn serialization_omits_unknown_fields() {
        let json = serde_json::to_string(&CondaLayout::empty()).unwrap();
        assert_eq!(json, "{}");

        let layout = CondaLayout {
            root: Some(PathBuf::from("/opt/conda")),
            ..CondaLayout::default()
        };
        let json = serde_json::to_string(&layout).unwrap();
        assert_eq!(json, r#"{"root":"/opt/conda"}"#);
    }
}
