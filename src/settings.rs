//! User settings persistence.
//!
//! Settings live in a single JSON document under the config dir. Loading
//! is lenient (missing or unreadable file yields defaults); saving goes
//! through a temp file and an atomic rename.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// User-configurable update policy and one-shot flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether the background daemon checks for updates at all
    #[serde(default = "default_auto_check")]
    pub auto_check_enabled: bool,
    /// Minimum seconds between automatic update runs
    #[serde(default = "default_interval")]
    pub check_interval_secs: u64,
    /// Unix ms of the last completed automatic check
    #[serde(default)]
    pub last_check: Option<i64>,
    /// Whether the background portal permission was already requested
    #[serde(default)]
    pub background_permission_asked: bool,
}

fn default_auto_check() -> bool {
    true
}

fn default_interval() -> u64 {
    86400
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_check_enabled: default_auto_check(),
            check_interval_secs: default_interval(),
            last_check: None,
            background_permission_asked: false,
        }
    }
}

/// Loads and persists [`Settings`].
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults on any problem.
    pub fn load(path: PathBuf) -> Self {
        let settings = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("settings file {} unreadable, using defaults: {e}", path.display());
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        };
        Self { path, settings }
    }

    /// Current settings snapshot.
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Mutate and persist in one step.
    pub fn update(&mut self, f: impl FnOnce(&mut Settings)) -> Result<()> {
        f(&mut self.settings);
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.settings)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(|e| RegistryError::SaveFailed {
                reason: format!("Failed to create temp settings file: {e}"),
            })?;
            file.write_all(serialized.as_bytes())
                .map_err(|e| RegistryError::SaveFailed {
                    reason: format!("Failed to write settings: {e}"),
                })?;
            file.sync_all().map_err(|e| RegistryError::SaveFailed {
                reason: format!("Failed to sync settings: {e}"),
            })?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| RegistryError::SaveFailed {
            reason: format!("Failed to rename temp settings file: {e}"),
        })?;
        Ok(())
    }
}
