//! Filesystem monitor for external deletions.
//!
//! Watches the applications directory and its `.installed` subtree. When
//! a watched path vanishes and matches a registry record, the monitor
//! emits a change signal; the driver reacts by running
//! `Registry::reconcile_with_filesystem` on its own loop. The monitor
//! itself never mutates the registry and never crashes the process.

use crate::locations::Locations;
use crate::registry::{InstallMode, InstallationRecord, Registry};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// A deletion observed under the installation roots that matched an
/// installed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDetected {
    /// Path that disappeared
    pub path: PathBuf,
    /// Digest of the affected record
    pub record_id: String,
}

/// Live watcher over the installation roots.
pub struct FilesystemMonitor {
    // Dropping the watcher stops the native watches.
    _watcher: RecommendedWatcher,
    changes: mpsc::UnboundedReceiver<ChangeDetected>,
}

impl FilesystemMonitor {
    /// Start watching `locations` for deletions of installed artifacts.
    pub fn start(
        locations: &Locations,
        registry: Arc<Mutex<Registry>>,
    ) -> notify::Result<Self> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("filesystem watch error: {e}");
                    return;
                }
            };
            if is_disappearance(&event.kind) {
                for path in event.paths {
                    let _ = raw_tx.send(path);
                }
            }
        })?;
        watcher.watch(&locations.apps_dir, RecursiveMode::NonRecursive)?;
        if locations.extracted_dir.is_dir() {
            watcher.watch(&locations.extracted_dir, RecursiveMode::Recursive)?;
        }

        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(path) = raw_rx.recv().await {
                let registry = registry.lock().await;
                if let Some(record) = affected_record(&registry.list(), &path) {
                    log::info!(
                        "watched path {} vanished (record '{}')",
                        path.display(),
                        record.name
                    );
                    let _ = changes_tx.send(ChangeDetected {
                        path: path.clone(),
                        record_id: record.id.clone(),
                    });
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            changes: changes_rx,
        })
    }

    /// Next detected change; `None` once the monitor shuts down.
    pub async fn next_change(&mut self) -> Option<ChangeDetected> {
        self.changes.recv().await
    }
}

/// Deletions and outbound moves both make an installed artifact vanish.
fn is_disappearance(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From))
    )
}

/// Record invalidated by the disappearance of `path`: exact match for
/// portable files, prefix match for extracted trees.
fn affected_record<'a>(
    records: &'a [InstallationRecord],
    path: &Path,
) -> Option<&'a InstallationRecord> {
    records.iter().find(|record| match record.mode {
        InstallMode::Portable => record.installed_path == path,
        InstallMode::Extracted => {
            record.installed_path == path || record.installed_path.starts_with(path)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::record::InstallationRecord;

    fn record(id: &str, mode: InstallMode, installed: &str) -> InstallationRecord {
        InstallationRecord {
            id: id.to_string(),
            name: id.to_string(),
            mode,
            source_checksum: id.to_string(),
            source_path: PathBuf::from("/tmp/src"),
            installed_path: PathBuf::from(installed),
            desktop_file: PathBuf::from("/d"),
            icon_path: PathBuf::from("/i"),
            bin_symlink: None,
            installed_at: 0,
            updated_at: None,
            version: None,
            last_modified: None,
            content_length: None,
            last_release_tag: None,
            zsync_update_info: None,
            original_exec_args: None,
            custom_exec_args: None,
            original_keywords: None,
            custom_keywords: None,
            original_wm_class: None,
            custom_wm_class: None,
            original_display_name: None,
            custom_display_name: None,
            original_update_url: None,
            custom_update_url: None,
            original_homepage: None,
            custom_homepage: None,
        }
    }

    #[test]
    fn portable_records_match_exactly() {
        let records = vec![record("a", InstallMode::Portable, "/apps/Foo.AppImage")];
        assert!(affected_record(&records, Path::new("/apps/Foo.AppImage")).is_some());
        assert!(affected_record(&records, Path::new("/apps/Foo")).is_none());
        assert!(affected_record(&records, Path::new("/apps")).is_none());
    }

    #[test]
    fn extracted_records_match_on_prefix() {
        let records = vec![record("a", InstallMode::Extracted, "/apps/.installed/foo")];
        // The tree itself and any ancestor deletion invalidate it.
        assert!(affected_record(&records, Path::new("/apps/.installed/foo")).is_some());
        assert!(affected_record(&records, Path::new("/apps/.installed")).is_some());
        assert!(affected_record(&records, Path::new("/apps/.installed/bar")).is_none());
    }

    #[test]
    fn disappearance_kinds() {
        use notify::event::{RemoveKind, ModifyKind, MetadataKind};
        assert!(is_disappearance(&EventKind::Remove(RemoveKind::File)));
        assert!(is_disappearance(&EventKind::Modify(ModifyKind::Name(
            RenameMode::From
        ))));
        assert!(!is_disappearance(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Any
        ))));
        assert!(!is_disappearance(&EventKind::Create(
            notify::event::CreateKind::File
        )));
    }
}
