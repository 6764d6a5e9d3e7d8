//! Local settings file (`.codewright/settings.local.json`)
//!
//! Holds permanent permission rules and the statistics of the last session.
//! Unknown keys are preserved on write.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::permissions::PermissionRule;
use crate::session::SessionStats;

/// Directory holding per-project state
pub const PROJECT_DIR: &str = ".codewright";
/// File name of the local settings
pub const LOCAL_SETTINGS_FILE: &str = "settings.local.json";

/// Permission rules as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<PermissionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<PermissionRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ask: Vec<PermissionRule>,
}

/// Contents of the local settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub permissions: PermissionSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session: Option<SessionStats>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Path of the local settings file for a project directory
    pub fn local_path(cwd: &Path) -> PathBuf {
        cwd.join(PROJECT_DIR).join(LOCAL_SETTINGS_FILE)
    }

    /// Load settings; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write settings, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Saved local settings");
        Ok(())
    }

    /// Load, modify and save in one step
    pub fn update(path: &Path, f: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut settings = Self::load(path)?;
        f(&mut settings);
        settings.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&Settings::local_path(dir.path())).unwrap();
        assert!(settings.permissions.allow.is_empty());
        assert!(settings.last_session.is_none());
    }

    #[test]
    fn test_save_and_load_preserves_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = Settings::local_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"permissions":{"allow":["Bash(git status)"]},"theme":"dark"}"#,
        )
        .unwrap();

        Settings::update(&path, |s| {
            s.permissions.deny.push(PermissionRule::bash_prefix("rm"));
        })
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.permissions.allow, vec![PermissionRule::bash_exact("git status")]);
        assert_eq!(settings.permissions.deny, vec![PermissionRule::bash_prefix("rm")]);
        assert_eq!(settings.extra.get("theme"), Some(&Value::String("dark".into())));
    }
}
