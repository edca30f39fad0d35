//! Persistent installation registry.
//!
//! The registry is the single source of truth mapping bundles to on-disk
//! state. It owns its records and history exclusively; other components
//! read through the lookup API and mutate through the operations here.
//!
//! Persistence is one pretty-printed JSON document,
//! `{ "installations": [ record-or-history-entry, ... ] }`, written via a
//! temp file and an atomic rename. Loads also accept the legacy flat
//! array format. Concurrent access from other processes (the background
//! daemon racing a foreground instance) is not synchronized; this is a
//! known limitation.

pub mod record;

pub use record::{
    effective_value, HistoryEntry, InstallMode, InstallationRecord, CLEARED_VALUE,
};

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Change notification, delivered to observers on their own tasks so
/// they never re-enter the registry under a half-applied mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    /// Records or history changed.
    Changed,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Record(InstallationRecord),
    History(HistoryEntry),
}

#[derive(Serialize, Deserialize, Default)]
struct Document {
    installations: Vec<StoredEntry>,
}

/// The registry proper.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    records: Vec<InstallationRecord>,
    history: HashMap<String, HistoryEntry>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Registry {
    /// Load the registry from `path`. A missing file yields an empty
    /// registry; a corrupt one is an error.
    pub fn load(path: PathBuf) -> Result<Self> {
        let (records, history) = match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), HashMap::new()),
            Err(e) => {
                return Err(RegistryError::Corrupted {
                    reason: format!("cannot read {}: {e}", path.display()),
                }
                .into())
            }
        };
        let (events, _) = broadcast::channel(32);
        Ok(Self {
            path,
            records,
            history,
            events,
        })
    }

    fn parse(contents: &str) -> Result<(Vec<InstallationRecord>, HashMap<String, HistoryEntry>)> {
        if contents.trim().is_empty() {
            return Ok((Vec::new(), HashMap::new()));
        }
        // Legacy format: a bare array of records, no history.
        let entries = if contents.trim_start().starts_with('[') {
            let records: Vec<InstallationRecord> =
                serde_json::from_str(contents).map_err(|e| RegistryError::Corrupted {
                    reason: format!("legacy array unreadable: {e}"),
                })?;
            return Ok((records, HashMap::new()));
        } else {
            let doc: Document =
                serde_json::from_str(contents).map_err(|e| RegistryError::Corrupted {
                    reason: e.to_string(),
                })?;
            doc.installations
        };

        let mut records = Vec::new();
        let mut history = HashMap::new();
        for entry in entries {
            match entry {
                StoredEntry::Record(record) => records.push(record),
                StoredEntry::History(h) => {
                    history.insert(h.name.to_lowercase(), h);
                }
            }
        }
        Ok((records, history))
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn notify(&self) {
        // Delivery happens on the receivers' tasks; a send with no
        // observers attached is fine.
        let _ = self.events.send(RegistryEvent::Changed);
    }

    /// Snapshot of all current records.
    pub fn list(&self) -> Vec<InstallationRecord> {
        self.records.clone()
    }

    /// Number of installed records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is installed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record with the given content digest.
    pub fn lookup_by_digest(&self, digest: &str) -> Option<&InstallationRecord> {
        self.records.iter().find(|r| r.id == digest)
    }

    /// Record whose installed artifact is at `path`.
    pub fn lookup_by_installed_path(&self, path: &Path) -> Option<&InstallationRecord> {
        self.records.iter().find(|r| r.installed_path == path)
    }

    /// Record installed from `path`.
    pub fn lookup_by_source_path(&self, path: &Path) -> Option<&InstallationRecord> {
        self.records.iter().find(|r| r.source_path == path)
    }

    /// Whether a bundle with this digest is installed.
    pub fn is_installed(&self, digest: &str) -> bool {
        self.lookup_by_digest(digest).is_some()
    }

    /// History entry left behind by an uninstall of `name`.
    pub fn lookup_history(&self, name: &str) -> Option<&HistoryEntry> {
        self.history.get(&name.to_lowercase())
    }

    /// Insert a record and drop any history entry with its name.
    /// Notifies observers.
    pub fn register(&mut self, record: InstallationRecord) {
        self.history.remove(&record.name.to_lowercase());
        self.records.push(record);
        self.notify();
    }

    /// Consume the history entry matching `name`, if one exists.
    pub fn take_history(&mut self, name: &str) -> Option<HistoryEntry> {
        self.history.remove(&name.to_lowercase())
    }

    /// Overwrite the record with the same id. Notifies when asked.
    pub fn update(&mut self, record: InstallationRecord, notify: bool) -> Result<()> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| RegistryError::UnknownRecord {
                id: record.id.clone(),
            })?;
        *slot = record;
        if notify {
            self.notify();
        }
        Ok(())
    }

    /// Remove the record with `id`, saving its customizations to history
    /// first. Notifies observers. Returns the removed record.
    pub fn unregister(&mut self, id: &str) -> Result<InstallationRecord> {
        let idx = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RegistryError::UnknownRecord { id: id.to_string() })?;
        let record = self.records.remove(idx);
        if record.has_custom_values() {
            self.history
                .insert(record.name.to_lowercase(), record.to_history());
        }
        self.notify();
        Ok(record)
    }

    /// Write the registry document to disk. Notifies when asked.
    pub fn persist(&self, notify: bool) -> Result<()> {
        let mut entries: Vec<StoredEntry> = self
            .records
            .iter()
            .cloned()
            .map(StoredEntry::Record)
            .collect();
        let mut history: Vec<&HistoryEntry> = self.history.values().collect();
        history.sort_by(|a, b| a.name.cmp(&b.name));
        entries.extend(history.into_iter().cloned().map(StoredEntry::History));

        let doc = Document {
            installations: entries,
        };
        let serialized = serde_json::to_string_pretty(&doc)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(|e| RegistryError::SaveFailed {
                reason: format!("creating temp file: {e}"),
            })?;
            file.write_all(serialized.as_bytes())
                .map_err(|e| RegistryError::SaveFailed {
                    reason: format!("writing registry: {e}"),
                })?;
            file.sync_all().map_err(|e| RegistryError::SaveFailed {
                reason: format!("syncing registry: {e}"),
            })?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| RegistryError::SaveFailed {
            reason: format!("renaming into place: {e}"),
        })?;

        if notify {
            self.notify();
        }
        Ok(())
    }

    /// Discard in-memory state and re-read from disk. Notifies when asked.
    pub fn reload(&mut self, notify: bool) -> Result<()> {
        let (records, history) = match fs::read_to_string(&self.path) {
            Ok(contents) => Self::parse(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (Vec::new(), HashMap::new()),
            Err(e) => {
                return Err(RegistryError::Corrupted {
                    reason: format!("cannot read {}: {e}", self.path.display()),
                }
                .into())
            }
        };
        self.records = records;
        self.history = history;
        if notify {
            self.notify();
        }
        Ok(())
    }

    /// Drop every record whose installed artifact vanished from disk,
    /// saving customizations to history and deleting the orphaned
    /// launcher, icon and symlink. Returns the orphaned records.
    pub fn reconcile_with_filesystem(&mut self) -> Result<Vec<InstallationRecord>> {
        let (orphans, kept): (Vec<_>, Vec<_>) = self
            .records
            .drain(..)
            .partition(|r| !r.installed_path.exists());
        self.records = kept;

        for orphan in &orphans {
            log::info!(
                "'{}' vanished from {}; dropping its record",
                orphan.name,
                orphan.installed_path.display()
            );
            if orphan.has_custom_values() {
                self.history
                    .insert(orphan.name.to_lowercase(), orphan.to_history());
            }
            for stale in [Some(&orphan.desktop_file), Some(&orphan.icon_path), orphan.bin_symlink.as_ref()]
                .into_iter()
                .flatten()
            {
                if let Err(e) = fs::remove_file(stale) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("could not remove orphaned {}: {e}", stale.display());
                    }
                }
            }
        }

        if !orphans.is_empty() {
            self.persist(false)?;
            self.notify();
        }
        Ok(orphans)
    }
}
