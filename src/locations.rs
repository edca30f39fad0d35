//! Per-user filesystem layout.
//!
//! All persistent state lives under the freedesktop.org base directories.
//! `XDG_DATA_HOME`, `XDG_CONFIG_HOME` and `XDG_RUNTIME_DIR` are honored;
//! the `dirs` crate supplies the fallbacks.

use std::path::PathBuf;

/// Directory name used for app-manager state under the XDG bases.
pub const APP_DIR_NAME: &str = "app-manager";

/// Autostart launcher file name.
pub const AUTOSTART_FILE_NAME: &str = "com.github.AppManager.desktop";

/// Resolved per-user layout.
///
/// Built once at startup and passed to the subsystems that need it; there
/// are no module-level singletons.
#[derive(Debug, Clone)]
pub struct Locations {
    /// `<user-data>/app-manager` - registry, update log
    pub data_dir: PathBuf,
    /// `<user-config>/app-manager` - settings
    pub config_dir: PathBuf,
    /// `<user-data>/applications` - generated launcher entries
    pub launchers_dir: PathBuf,
    /// `<user-data>/icons` - installed icons
    pub icons_dir: PathBuf,
    /// Directory receiving installed bundles
    pub apps_dir: PathBuf,
    /// `<apps>/.installed` - extracted-mode trees
    pub extracted_dir: PathBuf,
    /// `~/.local/bin` - optional PATH symlinks
    pub bin_dir: PathBuf,
    /// `<user-config>/autostart`
    pub autostart_dir: PathBuf,
    /// Runtime dir for process locks
    pub runtime_dir: PathBuf,
    /// `<user-data>/Trash` - destination for uninstalled portable files
    pub trash_dir: PathBuf,
}

impl Locations {
    /// Resolve the layout from the environment.
    pub fn resolve() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let data = std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local/share"));
        let config = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config"));
        let runtime = std::env::var_os("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);

        Self {
            data_dir: data.join(APP_DIR_NAME),
            config_dir: config.join(APP_DIR_NAME),
            launchers_dir: data.join("applications"),
            icons_dir: data.join("icons"),
            apps_dir: home.join("Applications"),
            extracted_dir: home.join("Applications").join(".installed"),
            bin_dir: home.join(".local/bin"),
            autostart_dir: config.join("autostart"),
            runtime_dir: runtime,
            trash_dir: data.join("Trash"),
        }
    }

    /// Layout rooted at an arbitrary directory, for tests.
    pub fn rooted_at(root: &std::path::Path) -> Self {
        Self {
            data_dir: root.join("data").join(APP_DIR_NAME),
            config_dir: root.join("config").join(APP_DIR_NAME),
            launchers_dir: root.join("data/applications"),
            icons_dir: root.join("data/icons"),
            apps_dir: root.join("Applications"),
            extracted_dir: root.join("Applications/.installed"),
            bin_dir: root.join(".local/bin"),
            autostart_dir: root.join("config/autostart"),
            runtime_dir: root.join("runtime"),
            trash_dir: root.join("data/Trash"),
        }
    }

    /// Path of the registry document.
    pub fn registry_file(&self) -> PathBuf {
        self.data_dir.join("installations.json")
    }

    /// Path of the append-only update log.
    pub fn update_log_file(&self) -> PathBuf {
        self.data_dir.join("updates.log")
    }

    /// Path of the user settings document.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// Path of the autostart launcher.
    pub fn autostart_file(&self) -> PathBuf {
        self.autostart_dir.join(AUTOSTART_FILE_NAME)
    }

    /// Directory holding per-bundle process locks.
    pub fn locks_dir(&self) -> PathBuf {
        self.runtime_dir.join("app-manager-locks")
    }

    /// Create every directory the engines write into.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            &self.data_dir,
            &self.config_dir,
            &self.launchers_dir,
            &self.icons_dir,
            &self.apps_dir,
            &self.extracted_dir,
            &self.bin_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// True when the process runs inside a Flatpak sandbox.
pub fn in_flatpak_sandbox() -> bool {
    std::env::var_os("FLATPAK_ID").is_some() || std::path::Path::new("/.flatpak-info").exists()
}

/// The bundle path of the running process, when it is itself a bundle.
pub fn self_bundle_path() -> Option<PathBuf> {
    std::env::var_os("APPIMAGE").map(PathBuf::from)
}
