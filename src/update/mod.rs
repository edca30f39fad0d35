//! Update engine.
//!
//! Resolves each record's update source, probes it for a newer release,
//! and applies updates through the installation engine's upgrade path.
//! Probes and updates run through a fixed-size worker pool; results come
//! back in submission order regardless of completion order. Every probe
//! and update leaves a line in the update log.

pub mod assets;
pub mod logging;
pub mod source;
pub mod version;

pub use assets::{select_asset, ReleaseAsset, ReleaseInfo};
pub use logging::{UpdateLog, UpdateStatus};
pub use source::{normalize_update_url, DeltaKind, ForgeKind, UpdateSource};

use crate::bundle::host_arch;
use crate::error::{Result, UpdateError};
use crate::installer::Installer;
use crate::locations::Locations;
use crate::registry::{InstallationRecord, Registry};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Fixed capacity of the probe/update worker pool.
pub const PROBE_WORKERS: usize = 5;

/// Why a probe decided not to update a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record carries no update URL at all
    NoUpdateUrl,
    /// The update URL could not be classified
    UnsupportedSource,
    /// Upstream is not newer than the installed bundle
    AlreadyCurrent,
    /// A release exists but offers no asset for this host
    MissingAsset,
    /// The forge API or server could not be reached
    ApiUnavailable,
    /// A direct URL answered without usable tracking headers
    NoTrackingHeaders,
}

impl SkipReason {
    /// Log-friendly rendering.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoUpdateUrl => "no update URL",
            Self::UnsupportedSource => "unsupported update source",
            Self::AlreadyCurrent => "already current",
            Self::MissingAsset => "no asset for this host",
            Self::ApiUnavailable => "API unavailable",
            Self::NoTrackingHeaders => "no tracking headers",
        }
    }
}

/// What applying the probed update will do. Internal to the engine.
#[derive(Debug, Clone, Default)]
pub(crate) struct UpdatePlan {
    /// Full-bundle download URL
    download_url: Option<String>,
    /// Delta manifest to hand to the delta tool, when available
    delta_manifest: Option<String>,
    /// Release tag to cache after success
    new_tag: Option<String>,
    /// Fingerprint headers to cache after success
    new_last_modified: Option<String>,
    /// Content length part of the fingerprint
    new_content_length: Option<u64>,
}

/// Outcome of probing one record.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Snapshot of the probed record
    pub record: InstallationRecord,
    /// Whether a newer bundle is available
    pub has_update: bool,
    /// Version offered upstream, when known
    pub available_version: Option<String>,
    /// Why nothing will be applied, when `has_update` is false
    pub skip_reason: Option<SkipReason>,
    /// Human-readable detail
    pub message: String,
    pub(crate) plan: UpdatePlan,
}

impl ProbeResult {
    fn skipped(record: &InstallationRecord, reason: SkipReason, message: impl Into<String>) -> Self {
        Self {
            record: record.clone(),
            has_update: false,
            available_version: None,
            skip_reason: Some(reason),
            message: message.into(),
            plan: UpdatePlan::default(),
        }
    }
}

/// Outcome of applying (or deciding not to apply) one update.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Digest of the record the outcome belongs to
    pub record_id: String,
    /// Display name, for reporting
    pub name: String,
    /// Terminal status
    pub status: UpdateStatus,
    /// Human-readable detail
    pub message: String,
}

/// Progress events consumed by an attached UI.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Probe started
    Checking(String),
    /// Asset download started
    Downloading(String),
    /// Update applied
    Succeeded(String),
    /// Update failed
    Failed(String, String),
    /// Update skipped
    Skipped(String, String),
}

/// The update engine. Cheap to clone; clones share the HTTP session,
/// the registry handle and the cancellation token.
#[derive(Clone)]
pub struct UpdateEngine {
    registry: Arc<Mutex<Registry>>,
    installer: Installer,
    client: reqwest::Client,
    update_log: UpdateLog,
    events: Option<mpsc::UnboundedSender<UpdateEvent>>,
    cancel: CancellationToken,
}

impl UpdateEngine {
    /// Engine over `registry`, writing state into `locations`.
    pub fn new(locations: Locations, registry: Arc<Mutex<Registry>>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("app-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        let update_log = UpdateLog::new(locations.update_log_file());
        let installer = Installer::new(locations);
        Self {
            registry,
            installer,
            client,
            update_log,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a progress event sink.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<UpdateEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Token cancelling every in-flight probe and download.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn emit(&self, event: UpdateEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Probe every record, up to [`PROBE_WORKERS`] in parallel. Results
    /// are returned in registry order.
    pub async fn probe_all(&self) -> Vec<ProbeResult> {
        let records = self.registry.lock().await.list();
        self.run_pool(records, |engine, record| async move {
            engine.probe(&record).await
        })
        .await
    }

    /// Probe and apply every record, up to [`PROBE_WORKERS`] in
    /// parallel. One record's failure never affects its siblings.
    pub async fn update_all(&self) -> Vec<UpdateOutcome> {
        let records = self.registry.lock().await.list();
        self.run_pool(records, |engine, record| async move {
            engine.update(&record).await
        })
        .await
    }

    /// Fan `records` through the worker pool, collecting results into
    /// submission-order slots.
    async fn run_pool<T, F, Fut>(&self, records: Vec<InstallationRecord>, work: F) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(UpdateEngine, InstallationRecord) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(PROBE_WORKERS));
        let mut join = JoinSet::new();
        let count = records.len();
        for (idx, record) in records.into_iter().enumerate() {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            let work = work.clone();
            join.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (idx, work(engine, record).await)
            });
        }

        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
        while let Some(joined) = join.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => log::warn!("probe worker panicked: {e}"),
            }
        }
        slots.into_iter().flatten().collect()
    }

    /// Probe one record for a newer release.
    pub async fn probe(&self, record: &InstallationRecord) -> ProbeResult {
        self.emit(UpdateEvent::Checking(record.name.clone()));
        let result = self.probe_inner(record).await;
        if let Some(reason) = result.skip_reason {
            self.update_log
                .record(UpdateStatus::Skipped, &record.name, reason.as_str());
            self.emit(UpdateEvent::Skipped(
                record.name.clone(),
                reason.as_str().to_string(),
            ));
        } else if result.has_update {
            self.update_log.record(
                UpdateStatus::Skipped,
                &record.name,
                &format!(
                    "update{} available, not applied",
                    result
                        .available_version
                        .as_deref()
                        .map(|v| format!(" to {v}"))
                        .unwrap_or_default()
                ),
            );
        }
        result
    }

    async fn probe_inner(&self, record: &InstallationRecord) -> ProbeResult {
        let Some(raw_url) = record.effective_update_url().map(str::to_string) else {
            return ProbeResult::skipped(record, SkipReason::NoUpdateUrl, "no update URL");
        };
        let Some(source) = UpdateSource::classify(&raw_url) else {
            return ProbeResult::skipped(
                record,
                SkipReason::UnsupportedSource,
                format!("unsupported update source: {raw_url}"),
            );
        };

        match source {
            UpdateSource::Forge(_) => self.probe_forge(record, &source).await,
            UpdateSource::Direct(url) => self.probe_direct(record, &url).await,
            UpdateSource::Delta(kind) => self.probe_delta(record, &kind).await,
        }
    }

    async fn probe_forge(&self, record: &InstallationRecord, source: &UpdateSource) -> ProbeResult {
        let releases = match self.fetch_releases(source).await {
            Ok(releases) => releases,
            Err(e) => {
                return ProbeResult::skipped(record, SkipReason::ApiUnavailable, e.to_string())
            }
        };
        if releases.is_empty() {
            return ProbeResult::skipped(record, SkipReason::ApiUnavailable, "no releases");
        }

        // First release offering an asset for this host; the newest
        // release otherwise.
        let host = host_arch();
        let chosen = releases
            .iter()
            .find(|r| select_asset(&r.assets, host).is_some())
            .unwrap_or(&releases[0]);
        let asset = select_asset(&chosen.assets, host);

        if !self.release_is_newer(record, chosen) {
            return ProbeResult::skipped(record, SkipReason::AlreadyCurrent, "already current");
        }
        let Some(asset) = asset else {
            return ProbeResult::skipped(
                record,
                SkipReason::MissingAsset,
                format!("release {} has no asset for {host}", chosen.tag),
            );
        };

        ProbeResult {
            record: record.clone(),
            has_update: true,
            available_version: chosen.version.clone(),
            skip_reason: None,
            message: format!("release {} offers {}", chosen.tag, asset.name),
            plan: UpdatePlan {
                download_url: Some(asset.url.clone()),
                delta_manifest: None,
                new_tag: Some(chosen.tag.clone()),
                new_last_modified: None,
                new_content_length: None,
            },
        }
    }

    /// Version comparison with cached-tag fallback when either side has
    /// no usable version.
    fn release_is_newer(&self, record: &InstallationRecord, release: &ReleaseInfo) -> bool {
        match (&release.version, &record.version) {
            (Some(available), Some(current)) if !version::normalize(current).is_empty() => {
                version::is_newer(available, current)
            }
            _ => record.last_release_tag.as_deref() != Some(release.tag.as_str()),
        }
    }

    async fn probe_direct(&self, record: &InstallationRecord, url: &str) -> ProbeResult {
        let response = match self.client.head(url).send().await {
            Ok(r) => r,
            Err(e) => {
                return ProbeResult::skipped(record, SkipReason::ApiUnavailable, e.to_string())
            }
        };
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let Some(seen) = fingerprint(last_modified.as_deref(), content_length) else {
            return ProbeResult::skipped(
                record,
                SkipReason::NoTrackingHeaders,
                "server sent neither Last-Modified nor Content-Length",
            );
        };

        match fingerprint(record.last_modified.as_deref(), record.content_length) {
            None => {
                // First observation: remember the baseline, nothing to do.
                let mut updated = record.clone();
                updated.last_modified = last_modified;
                updated.content_length = content_length;
                let mut registry = self.registry.lock().await;
                if let Err(e) = registry
                    .update(updated, false)
                    .and_then(|_| registry.persist(false))
                {
                    log::warn!("could not record probe baseline for {}: {e}", record.name);
                }
                ProbeResult::skipped(record, SkipReason::AlreadyCurrent, "baseline recorded")
            }
            Some(stored) if stored == seen => {
                ProbeResult::skipped(record, SkipReason::AlreadyCurrent, "unchanged upstream")
            }
            Some(_) => ProbeResult {
                record: record.clone(),
                has_update: true,
                available_version: None,
                skip_reason: None,
                message: format!("upstream changed ({seen})"),
                plan: UpdatePlan {
                    download_url: Some(url.to_string()),
                    delta_manifest: None,
                    new_tag: None,
                    new_last_modified: last_modified,
                    new_content_length: content_length,
                },
            },
        }
    }

    async fn probe_delta(&self, record: &InstallationRecord, kind: &DeltaKind) -> ProbeResult {
        match kind {
            DeltaKind::Forge {
                owner,
                repo,
                tag,
                pattern,
            } => {
                let source = UpdateSource::Delta(kind.clone());
                let releases = match self.fetch_releases(&source).await {
                    Ok(r) => r,
                    Err(e) => {
                        return ProbeResult::skipped(
                            record,
                            SkipReason::ApiUnavailable,
                            e.to_string(),
                        )
                    }
                };
                let release = if tag == "latest" {
                    releases.first()
                } else {
                    releases.iter().find(|r| &r.tag == tag).or(releases.first())
                };
                let Some(release) = release else {
                    return ProbeResult::skipped(
                        record,
                        SkipReason::ApiUnavailable,
                        format!("no releases for {owner}/{repo}"),
                    );
                };

                let manifest = glob::Pattern::new(pattern).ok().and_then(|p| {
                    release
                        .assets
                        .iter()
                        .find(|a| p.matches(&a.name))
                        .map(|a| a.url.clone())
                });
                let Some(manifest) = manifest else {
                    return ProbeResult::skipped(
                        record,
                        SkipReason::MissingAsset,
                        format!("no asset of release {} matches {pattern}", release.tag),
                    );
                };

                // Tags may carry channel metadata after an `@`.
                let tag_version = release.tag.split('@').next().unwrap_or(&release.tag);
                let available = version::normalize(tag_version);
                if let (false, Some(current)) = (available.is_empty(), &record.version) {
                    if !version::normalize(current).is_empty() {
                        if !version::is_newer(&available, current) {
                            return ProbeResult::skipped(
                                record,
                                SkipReason::AlreadyCurrent,
                                "already current",
                            );
                        }
                        return self.delta_result(record, &manifest, Some(available), Some(&release.tag));
                    }
                }
                // No comparable versions; fall back to manifest headers.
                self.probe_delta_by_fingerprint(record, &manifest, Some(&release.tag))
                    .await
            }
            DeltaKind::Direct { url } => self.probe_delta_by_fingerprint(record, url, None).await,
        }
    }

    async fn probe_delta_by_fingerprint(
        &self,
        record: &InstallationRecord,
        manifest: &str,
        tag: Option<&str>,
    ) -> ProbeResult {
        let mut result = self.probe_direct(record, manifest).await;
        if result.has_update {
            result.plan.delta_manifest = Some(manifest.to_string());
            result.plan.download_url = Some(full_bundle_url(manifest));
            result.plan.new_tag = tag.map(str::to_string);
            result.message = format!("delta manifest changed at {manifest}");
        }
        result
    }

    fn delta_result(
        &self,
        record: &InstallationRecord,
        manifest: &str,
        available: Option<String>,
        tag: Option<&str>,
    ) -> ProbeResult {
        ProbeResult {
            record: record.clone(),
            has_update: true,
            available_version: available.clone(),
            skip_reason: None,
            message: format!(
                "delta update{} available",
                available.map(|v| format!(" to {v}")).unwrap_or_default()
            ),
            plan: UpdatePlan {
                download_url: Some(full_bundle_url(manifest)),
                delta_manifest: Some(manifest.to_string()),
                new_tag: tag.map(str::to_string),
                new_last_modified: None,
                new_content_length: None,
            },
        }
    }

    /// Probe and, when an update is present, download and apply it.
    pub async fn update(&self, record: &InstallationRecord) -> UpdateOutcome {
        self.emit(UpdateEvent::Checking(record.name.clone()));
        let probe = self.probe_inner(record).await;
        if !probe.has_update {
            if let Some(reason) = probe.skip_reason {
                self.update_log
                    .record(UpdateStatus::Skipped, &record.name, reason.as_str());
                self.emit(UpdateEvent::Skipped(
                    record.name.clone(),
                    reason.as_str().to_string(),
                ));
            }
            return UpdateOutcome {
                record_id: record.id.clone(),
                name: record.name.clone(),
                status: UpdateStatus::Skipped,
                message: probe.message,
            };
        }

        match self.apply(record, &probe).await {
            Ok(new_version) => {
                let detail = match (&record.version, &new_version) {
                    (Some(old), Some(new)) => format!("{old} -> {new}"),
                    (_, Some(new)) => format!("updated to {new}"),
                    _ => "updated".to_string(),
                };
                self.update_log
                    .record(UpdateStatus::Updated, &record.name, &detail);
                self.emit(UpdateEvent::Succeeded(record.name.clone()));
                UpdateOutcome {
                    record_id: record.id.clone(),
                    name: record.name.clone(),
                    status: UpdateStatus::Updated,
                    message: detail,
                }
            }
            Err(e) => {
                let reason = e.to_string();
                self.update_log
                    .record(UpdateStatus::Failed, &record.name, &reason);
                self.emit(UpdateEvent::Failed(record.name.clone(), reason.clone()));
                UpdateOutcome {
                    record_id: record.id.clone(),
                    name: record.name.clone(),
                    status: UpdateStatus::Failed,
                    message: reason,
                }
            }
        }
    }

    /// Download the probed asset and run the upgrade. Returns the new
    /// version, when known.
    async fn apply(
        &self,
        record: &InstallationRecord,
        probe: &ProbeResult,
    ) -> Result<Option<String>> {
        let scratch = tempfile::Builder::new().prefix("appmgr-update-").tempdir()?;
        self.emit(UpdateEvent::Downloading(record.name.clone()));

        let downloaded = scratch.path().join(download_file_name(probe, record));
        let mut fetched = false;
        if let Some(manifest) = &probe.plan.delta_manifest {
            fetched = self
                .delta_download(record, manifest, &downloaded)
                .await;
        }
        if !fetched {
            let url = probe
                .plan
                .download_url
                .clone()
                .ok_or_else(|| UpdateError::DownloadFailed {
                    url: String::new(),
                    reason: "no download URL in probe".to_string(),
                })?;
            self.download_to(&url, &downloaded).await?;
        }

        let mut registry = self.registry.lock().await;
        let mut new_record = self
            .installer
            .upgrade(&mut registry, &record.id, &downloaded, self.cancel.child_token())
            .await?;

        new_record.last_release_tag = probe
            .plan
            .new_tag
            .clone()
            .or(new_record.last_release_tag.take());
        if probe.plan.new_last_modified.is_some() || probe.plan.new_content_length.is_some() {
            new_record.last_modified = probe.plan.new_last_modified.clone();
            new_record.content_length = probe.plan.new_content_length;
        }
        if let Some(v) = &probe.available_version {
            new_record.version.get_or_insert_with(|| v.clone());
        }
        let version = new_record.version.clone();
        registry.update(new_record, false)?;
        registry.persist(true)?;
        Ok(version)
    }

    /// Fetch only the changed blocks through the local delta tool, using
    /// the installed bundle as seed. `false` means the caller must fall
    /// back to a full download.
    async fn delta_download(
        &self,
        record: &InstallationRecord,
        manifest: &str,
        dest: &Path,
    ) -> bool {
        let Some(tool) = delta_download_tool() else {
            log::debug!("no delta download tool, falling back to full download");
            return false;
        };
        let seed = &record.installed_path;
        if !seed.is_file() {
            return false;
        }

        let mut child = match tokio::process::Command::new(&tool)
            .arg("-i")
            .arg(seed)
            .arg("-o")
            .arg(dest)
            .arg(manifest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::warn!("delta tool spawn failed: {e}");
                return false;
            }
        };

        let status = tokio::select! {
            status = child.wait() => status,
            _ = self.cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return false;
            }
        };
        match status {
            Ok(s) if s.success() && dest.is_file() => true,
            Ok(s) => {
                log::warn!("delta download exited with {s}, falling back");
                false
            }
            Err(e) => {
                log::warn!("delta download failed: {e}, falling back");
                false
            }
        }
    }

    /// Streamed download with cancellation checks between chunks.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<()> {
        let failed = |reason: String| UpdateError::DownloadFailed {
            url: url.to_string(),
            reason,
        };
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| failed(e.to_string()))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| failed(format!("creating {}: {e}", dest.display())))?;
        loop {
            if self.cancel.is_cancelled() {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(UpdateError::Cancelled.into());
            }
            match response.chunk().await.map_err(|e| failed(e.to_string()))? {
                Some(chunk) => file
                    .write_all(&chunk)
                    .await
                    .map_err(|e| failed(e.to_string()))?,
                None => break,
            }
        }
        file.flush().await.map_err(|e| failed(e.to_string()))?;
        Ok(())
    }

    /// Releases of a forge source, newest first, normalized.
    async fn fetch_releases(&self, source: &UpdateSource) -> Result<Vec<ReleaseInfo>> {
        let api_url = source.api_url().ok_or_else(|| UpdateError::UnsupportedSource {
            url: format!("{source:?}"),
        })?;
        let response = self
            .client
            .get(&api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        match source {
            UpdateSource::Forge(ForgeKind::GitLab { .. }) => {
                let releases: Vec<GitLabRelease> = response.json().await?;
                Ok(releases.into_iter().map(GitLabRelease::into_info).collect())
            }
            _ => {
                let releases: Vec<GitHubRelease> = response.json().await?;
                Ok(releases.into_iter().map(GitHubRelease::into_info).collect())
            }
        }
    }
}

/// Shared fingerprint format for direct-URL change detection.
fn fingerprint(last_modified: Option<&str>, content_length: Option<u64>) -> Option<String> {
    match (last_modified, content_length) {
        (Some(lm), len) => Some(format!(
            "{lm}|{}",
            len.map(|l| l.to_string()).unwrap_or_default()
        )),
        (None, Some(len)) => Some(format!("size:{len}")),
        (None, None) => None,
    }
}

/// Full-bundle URL behind a delta manifest.
fn full_bundle_url(manifest: &str) -> String {
    manifest
        .strip_suffix(".zsync")
        .unwrap_or(manifest)
        .to_string()
}

fn download_file_name(probe: &ProbeResult, record: &InstallationRecord) -> String {
    probe
        .plan
        .download_url
        .as_deref()
        .and_then(|u| u.rsplit('/').next())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.AppImage", crate::bundle::sanitize_stem(&record.name)))
}

/// Locate the local delta downloader.
fn delta_download_tool() -> Option<PathBuf> {
    which::which("zsync2").or_else(|_| which::which("zsync")).ok()
}

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

impl GitHubRelease {
    fn into_info(self) -> ReleaseInfo {
        let version = Some(version::normalize(&self.tag_name)).filter(|v| !v.is_empty());
        ReleaseInfo {
            tag: self.tag_name,
            version,
            assets: self
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    url: a.browser_download_url,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct GitLabRelease {
    tag_name: String,
    #[serde(default)]
    assets: GitLabAssets,
}

#[derive(Deserialize, Default)]
struct GitLabAssets {
    #[serde(default)]
    links: Vec<GitLabLink>,
}

#[derive(Deserialize)]
struct GitLabLink {
    name: String,
    url: String,
}

impl GitLabRelease {
    fn into_info(self) -> ReleaseInfo {
        let version = Some(version::normalize(&self.tag_name)).filter(|v| !v.is_empty());
        ReleaseInfo {
            tag: self.tag_name,
            version,
            assets: self
                .assets
                .links
                .into_iter()
                .map(|l| ReleaseAsset {
                    name: l.name,
                    url: l.url,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_formats() {
        assert_eq!(
            fingerprint(Some("Wed, 01 Jan 2025 00:00:00 GMT"), Some(123)).as_deref(),
            Some("Wed, 01 Jan 2025 00:00:00 GMT|123")
        );
        assert_eq!(
            fingerprint(Some("Wed, 01 Jan 2025 00:00:00 GMT"), None).as_deref(),
            Some("Wed, 01 Jan 2025 00:00:00 GMT|")
        );
        assert_eq!(fingerprint(None, Some(123)).as_deref(), Some("size:123"));
        assert_eq!(fingerprint(None, None), None);
    }

    #[test]
    fn full_bundle_url_strips_manifest_suffix() {
        assert_eq!(
            full_bundle_url("https://example.com/App.AppImage.zsync"),
            "https://example.com/App.AppImage"
        );
        assert_eq!(
            full_bundle_url("https://example.com/App.AppImage"),
            "https://example.com/App.AppImage"
        );
    }

    #[test]
    fn github_release_json_shape() {
        let json = r#"[{
            "tag_name": "v1.2",
            "assets": [
                {"name": "Foo-x86_64.AppImage",
                 "browser_download_url": "https://example.com/Foo-x86_64.AppImage"},
                {"name": "Foo-aarch64.AppImage",
                 "browser_download_url": "https://example.com/Foo-aarch64.AppImage"}
            ]
        }]"#;
        let releases: Vec<GitHubRelease> = serde_json::from_str(json).unwrap();
        let info = releases.into_iter().map(GitHubRelease::into_info).next().unwrap();
        assert_eq!(info.tag, "v1.2");
        assert_eq!(info.version.as_deref(), Some("1.2"));
        assert_eq!(info.assets.len(), 2);
        let chosen = select_asset(&info.assets, "x86_64").unwrap();
        assert_eq!(chosen.name, "Foo-x86_64.AppImage");
    }

    #[test]
    fn gitlab_release_json_shape() {
        let json = r#"[{
            "tag_name": "v2.0",
            "assets": {"links": [
                {"name": "App.AppImage", "url": "https://gitlab.com/p/-/releases/v2.0/App.AppImage"}
            ]}
        }]"#;
        let releases: Vec<GitLabRelease> = serde_json::from_str(json).unwrap();
        let info = releases.into_iter().map(GitLabRelease::into_info).next().unwrap();
        assert_eq!(info.version.as_deref(), Some("2.0"));
        assert_eq!(info.assets.len(), 1);
    }

    #[test]
    fn download_name_falls_back_to_record_name() {
        let record = crate::registry::record::InstallationRecord {
            id: "x".into(),
            name: "My App".into(),
            mode: crate::registry::InstallMode::Portable,
            source_checksum: "x".into(),
            source_path: "/tmp/a".into(),
            installed_path: "/apps/a".into(),
            desktop_file: "/apps/a.desktop".into(),
            icon_path: "/icons/a.png".into(),
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
        };
        let mut probe = ProbeResult::skipped(&record, SkipReason::NoUpdateUrl, "");
        probe.plan.download_url = Some("https://example.com/dl/Foo.AppImage".into());
        assert_eq!(download_file_name(&probe, &record), "Foo.AppImage");
        probe.plan.download_url = None;
        assert_eq!(download_file_name(&probe, &record), "My-App.AppImage");
    }
}
