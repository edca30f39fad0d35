//! Installation records and uninstall history entries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sentinel stored in a `custom_*` field when the user explicitly un-set
/// it. Persisted in the JSON so the un-set survives reloads.
pub const CLEARED_VALUE: &str = "__cleared__";

/// How a bundle is kept on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallMode {
    /// Single file in the applications directory
    Portable,
    /// Unpacked tree under `.installed/`
    Extracted,
}

/// Paired original/custom values for one user-editable launcher field.
///
/// The effective value is the custom one when it is non-empty and not the
/// cleared sentinel, else the original.
pub fn effective_value<'a>(
    original: Option<&'a str>,
    custom: Option<&'a str>,
) -> Option<&'a str> {
    match custom {
        Some(value) if !value.is_empty() && value != CLEARED_VALUE => Some(value),
        Some(value) if value == CLEARED_VALUE => None,
        _ => original.filter(|v| !v.is_empty()),
    }
}

/// The central entity: one installed bundle.
///
/// Uniquely identified by the SHA-256 digest of the bundle that first
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallationRecord {
    /// SHA-256 content digest of the installed bundle
    pub id: String,
    /// Display name
    pub name: String,
    /// On-disk layout
    pub mode: InstallMode,
    /// Digest of the source file at install time
    pub source_checksum: String,
    /// Where the bundle came from
    pub source_path: PathBuf,
    /// Installed artifact (file for portable, directory for extracted)
    pub installed_path: PathBuf,
    /// Generated launcher entry
    pub desktop_file: PathBuf,
    /// Installed icon
    pub icon_path: PathBuf,
    /// Optional PATH symlink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_symlink: Option<PathBuf>,
    /// Unix ms of the first install
    pub installed_at: i64,
    /// Unix ms of the last upgrade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Semantic version, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Cached `Last-Modified` of the last direct-URL probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Cached `Content-Length` of the last direct-URL probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Tag of the release that produced the installed bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release_tag: Option<String>,
    /// Delta-update manifest URL advertised by the bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zsync_update_info: Option<String>,

    /// Launcher `Exec` arguments as generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_exec_args: Option<String>,
    /// User override of the `Exec` arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_exec_args: Option<String>,
    /// Launcher `Keywords` as shipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_keywords: Option<String>,
    /// User override of `Keywords`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_keywords: Option<String>,
    /// `StartupWMClass` as shipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_wm_class: Option<String>,
    /// User override of `StartupWMClass`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_wm_class: Option<String>,
    /// Display name as shipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_display_name: Option<String>,
    /// User override of the display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_display_name: Option<String>,
    /// Update URL as shipped (launcher key or embedded hint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_update_url: Option<String>,
    /// User override of the update URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_update_url: Option<String>,
    /// Homepage as shipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_homepage: Option<String>,
    /// User override of the homepage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_homepage: Option<String>,
}

impl InstallationRecord {
    /// Effective display name.
    pub fn effective_name(&self) -> &str {
        effective_value(
            self.original_display_name.as_deref(),
            self.custom_display_name.as_deref(),
        )
        .unwrap_or(&self.name)
    }

    /// Effective update URL for probing.
    pub fn effective_update_url(&self) -> Option<&str> {
        effective_value(
            self.original_update_url.as_deref(),
            self.custom_update_url.as_deref(),
        )
    }

    /// Effective launcher keywords.
    pub fn effective_keywords(&self) -> Option<&str> {
        effective_value(
            self.original_keywords.as_deref(),
            self.custom_keywords.as_deref(),
        )
    }

    /// Effective window class.
    pub fn effective_wm_class(&self) -> Option<&str> {
        effective_value(
            self.original_wm_class.as_deref(),
            self.custom_wm_class.as_deref(),
        )
    }

    /// Effective homepage.
    pub fn effective_homepage(&self) -> Option<&str> {
        effective_value(
            self.original_homepage.as_deref(),
            self.custom_homepage.as_deref(),
        )
    }

    /// Whether any user customization is present.
    pub fn has_custom_values(&self) -> bool {
        [
            &self.custom_exec_args,
            &self.custom_keywords,
            &self.custom_wm_class,
            &self.custom_display_name,
            &self.custom_update_url,
            &self.custom_homepage,
        ]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }

    /// The history entry this record would leave behind on uninstall.
    pub fn to_history(&self) -> HistoryEntry {
        HistoryEntry {
            name: self.name.clone(),
            custom_exec_args: self.custom_exec_args.clone(),
            custom_keywords: self.custom_keywords.clone(),
            custom_wm_class: self.custom_wm_class.clone(),
            custom_display_name: self.custom_display_name.clone(),
            custom_update_url: self.custom_update_url.clone(),
            custom_homepage: self.custom_homepage.clone(),
        }
    }

    /// Restore customizations preserved by an earlier uninstall.
    pub fn apply_history(&mut self, history: &HistoryEntry) {
        self.custom_exec_args = history.custom_exec_args.clone();
        self.custom_keywords = history.custom_keywords.clone();
        self.custom_wm_class = history.custom_wm_class.clone();
        self.custom_display_name = history.custom_display_name.clone();
        self.custom_update_url = history.custom_update_url.clone();
        self.custom_homepage = history.custom_homepage.clone();
    }
}

/// Customizations retained after uninstall, keyed by lower-cased name.
///
/// Serialized into the same `installations` array as records and
/// distinguished by the absence of the `id` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Display name of the uninstalled record
    pub name: String,
    /// Preserved `Exec` argument override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_exec_args: Option<String>,
    /// Preserved `Keywords` override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_keywords: Option<String>,
    /// Preserved window-class override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_wm_class: Option<String>,
    /// Preserved display-name override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_display_name: Option<String>,
    /// Preserved update-URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_update_url: Option<String>,
    /// Preserved homepage override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_homepage: Option<String>,
}
