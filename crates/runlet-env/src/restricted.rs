// SPDX-License-Identifier: MIT OR Apache-2.0
//! Restricted environment construction.
//!
//! Child processes never inherit the parent environment wholesale. A
//! short whitelist of system variables is carried over, `PATH` is rebuilt
//! with the manager's directories in front, and a few variables are
//! injected so embedded Python tooling streams UTF-8 without buffering.

use crate::CondaLayout;
use runlet_core::Platform;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Variables carried over from the parent environment when present.
pub const ENV_WHITELIST: &[&str] = &[
    "SYSTEMROOT",
    "WINDIR",
    "TEMP",
    "TMP",
    "USERPROFILE",
    "USERNAME",
    "PROGRAMFILES",
    "PROGRAMFILES(X86)",
    "PROGRAMDATA",
    "ALLUSERSPROFILE",
    "PUBLIC",
    "COMPUTERNAME",
    "SystemDrive",
    "HOMEDRIVE",
    "HOMEPATH",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Additional variables carried over on POSIX hosts.
pub const POSIX_ENV_WHITELIST: &[&str] = &[
    "HOME", "USER", "LOGNAME", "SHELL", "LANG", "LC_ALL", "TMPDIR", "TERM",
];

/// The fully resolved environment handed to a spawned child.
pub type ResolvedEnv = BTreeMap<String, String>;

/// Snapshot the current process environment, dropping non-UTF-8 entries.
#[must_use]
pub fn parent_env_snapshot() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Build the restricted environment for a child process.
///
/// `PATH` is assembled from the manager layout's directories (each one
/// only when it exists on disk), deduplicated under the platform's path
/// normalisation, and the parent `PATH` is appended whole so system
/// tools stay reachable.
#[must_use]
pub fn build_restricted_env(
    layout: &CondaLayout,
    platform: Platform,
    parent: &BTreeMap<String, String>,
) -> ResolvedEnv {
    let mut env = ResolvedEnv::new();

    for var in ENV_WHITELIST {
        if let Some(value) = parent_get(parent, var, platform) {
            env.insert((*var).to_string(), value.to_string());
        }
    }
    if !platform.is_windows() {
        for var in POSIX_ENV_WHITELIST {
            if let Some(value) = parent_get(parent, var, platform) {
                env.insert((*var).to_string(), value.to_string());
            }
        }
    }

    env.insert("PATH".to_string(), build_path(layout, platform, parent));

    env.insert("PYTHONUTF8".to_string(), "1".to_string());
    env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
    env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
    if let Some(root) = &layout.root {
        env.insert("CONDA_ROOT".to_string(), root.display().to_string());
    }
    if platform.is_windows() {
        let comspec = parent_get(parent, "COMSPEC", platform)
            .unwrap_or(r"C:\WINDOWS\system32\cmd.exe");
        env.insert("COMSPEC".to_string(), comspec.to_string());
    }

    env
}

fn build_path(layout: &CondaLayout, platform: Platform, parent: &BTreeMap<String, String>) -> String {
    let mut prepends: Vec<PathBuf> = Vec::new();

    if let Some(dir) = &layout.condabin_dir {
        if dir.is_dir() {
            prepends.push(dir.clone());
        }
    }
    match platform {
        Platform::Windows => {
            if let Some(dir) = &layout.scripts_dir {
                if dir.is_dir() {
                    prepends.push(dir.clone());
                }
            }
        }
        Platform::Posix => {
            // POSIX installs keep the binary under <root>/bin rather than
            // a Scripts directory.
            if let Some(dir) = layout.exe.as_deref().and_then(|exe| exe.parent()) {
                if dir.is_dir() {
                    prepends.push(dir.to_path_buf());
                }
            }
        }
    }
    if let Some(dir) = &layout.library_bin_dir {
        if dir.is_dir() {
            prepends.push(dir.clone());
        }
    }
    if let Some(root) = &layout.root {
        if root.is_dir() {
            prepends.push(root.clone());
        }
        if platform.is_windows() {
            for extra in [
                root.join("Library").join("mingw-w64").join("bin"),
                root.join("Library").join("usr").join("bin"),
            ] {
                if extra.is_dir() {
                    prepends.push(extra);
                }
            }
        }
    }

    let mut seen = BTreeSet::new();
    let mut unique = Vec::new();
    for dir in prepends {
        if seen.insert(platform.path_key(&dir)) {
            unique.push(dir.display().to_string());
        }
    }

    let sep = platform.path_list_separator();
    let mut path_value = unique.join(&sep.to_string());
    if let Some(parent_path) = parent_get(parent, "PATH", platform) {
        if !parent_path.is_empty() {
            if path_value.is_empty() {
                path_value = parent_path.to_string();
            } else {
                path_value.push(sep);
                path_value.push_str(parent_path);
            }
        }
    }
    path_value
}

/// Windows environment-variable names are case-insensitive.
fn parent_get<'a>(
    parent: &'a BTreeMap<String, String>,
    name: &str,
    platform: Platform,
) -> Option<&'a str> {
    if platform.is_windows() {
        parent
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    } else {
        parent.get(name).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
