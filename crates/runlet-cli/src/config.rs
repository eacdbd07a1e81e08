// SPDX-License-Identifier: MIT OR Apache-2.0
//! Optional `runlet.toml` configuration.
//!
//! Everything here is a default: command-line flags always win over file
//! values.

use anyhow::Result;
use runlet_exec::{BackendKind, TempScriptPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File looked up in the current directory when `--config` is not given.
pub const CONFIG_FILE: &str = "runlet.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    /// Engine tuning applied to `run` and `plan`.
    #[serde(default)]
    pub engine: EngineConfig,
}

/// The `[engine]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Pump backend (`tasks` | `select`).
    #[serde(default)]
    pub backend: Option<BackendSetting>,
    /// Wrapper-script placement (`colocated` | `system-temp`).
    #[serde(default)]
    pub script_dir: Option<ScriptDirSetting>,
    /// Manager executable override, honored as if `CONDA_EXE` were set.
    /// The variable itself still wins when both are present.
    #[serde(default)]
    pub conda_exe: Option<PathBuf>,
    /// Grace period in milliseconds for each escalation step when a run
    /// is cancelled.
    #[serde(default)]
    pub kill_grace_ms: Option<u64>,
}

/// Backend token as written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSetting {
    /// One reader task per pipe.
    Tasks,
    /// A single task multiplexing both pipes.
    Select,
}

impl From<BackendSetting> for BackendKind {
    fn from(value: BackendSetting) -> Self {
        match value {
            BackendSetting::Tasks => BackendKind::TaskPerStream,
            BackendSetting::Select => BackendKind::Multiplexed,
        }
    }
}

/// Script placement token as written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptDirSetting {
    /// Next to the run's working directory.
    Colocated,
    /// In the system temp directory.
    SystemTemp,
}

impl From<ScriptDirSetting> for TempScriptPolicy {
    fn from(value: ScriptDirSetting) -> Self {
        match value {
            ScriptDirSetting::Colocated => TempScriptPolicy::Colocated,
            ScriptDirSetting::SystemTemp => TempScriptPolicy::SystemTemp,
        }
    }
}

/// Load the configuration.
///
/// An explicit `path` must exist and parse; the implicit `runlet.toml` is
/// used when present and silently skipped otherwise.
pub fn load(path: Option<&Path>) -> Result<CliConfig> {
    let explicit = path.is_some();
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(CONFIG_FILE),
    };
    if !path.exists() {
        if explicit {
            anyhow::bail!("config file '{}' not found", path.display());
        }
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read config file '{}': {e}", path.display()))?;
    toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file '{}': {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_engine_section_parses() {
        let cfg: CliConfig = toml::from_str(
            r#"
[engine]
backend = "select"
script_dir = "system-temp"
conda_exe = "/opt/conda/bin/conda"
kill_grace_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(cfg.engine.backend, Some(BackendSetting::Select));
        assert_eq!(cfg.engine.script_dir, Some(ScriptDirSetting::SystemTemp));
        assert_eq!(
            cfg.engine.conda_exe.as_deref(),
            Some(Path::new("/opt/conda/bin/conda"))
        );
        assert_eq!(cfg.engine.kill_grace_ms, Some(250));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: CliConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.engine.backend, None);
        assert_eq!(cfg.engine.script_dir, None);
        assert_eq!(cfg.engine.conda_exe, None);
        assert_eq!(cfg.engine.kill_grace_ms, None);
    }

    #[test]
    fn unknown_backend_token_is_rejected() {
        let err = toml::from_str::<CliConfig>("[engine]\nbackend = \"threads\"\n").unwrap_err();
        assert!(err.to_string().contains("backend"));
    }

    #[test]
    fn settings_map_onto_engine_types() {
        assert_eq!(
            BackendKind::from(BackendSetting::Tasks),
            BackendKind::TaskPerStream
        );
        assert_eq!(
            BackendKind::from(BackendSetting::Select),
            BackendKind::Multiplexed
        );
        assert_eq!(
            TempScriptPolicy::from(ScriptDirSetting::Colocated),
            TempScriptPolicy::Colocated
        );
        assert_eq!(
            TempScriptPolicy::from(ScriptDirSetting::SystemTemp),
            TempScriptPolicy::SystemTemp
        );
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load(Some(Path::new("/no/such/dir/runlet.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn garbage_content_reports_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlet.toml");
        std::fs::write(&path, "[engine\nbackend = ").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
