//! Append-only update log.
//!
//! Every probe and update outcome leaves one line in
//! `<data>/updates.log`: `<ISO-8601-local-time> [STATUS] <name>: <detail>`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Outcome recorded per log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// A new bundle was applied
    Updated,
    /// Nothing to do, with a reason
    Skipped,
    /// The probe or apply failed
    Failed,
}

impl UpdateStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "UPDATED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }
}

/// Writer over the update log file.
#[derive(Debug, Clone)]
pub struct UpdateLog {
    path: PathBuf,
}

impl UpdateLog {
    /// Log writing to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append one outcome line. Logging failures are warnings; the
    /// engines never fail an operation over its log line.
    pub fn record(&self, status: UpdateStatus, name: &str, detail: &str) {
        let line = format!(
            "{} [{}] {}: {}\n",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%:z"),
            status.as_str(),
            name,
            detail
        );
        if let Err(e) = self.append(&line) {
            log::warn!("could not write update log {}: {e}", self.path.display());
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
