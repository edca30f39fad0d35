//! Bundle asset extraction.
//!
//! Bundles carry one of two container formats behind the ELF wrapper:
//! SquashFS (extracted with `unsquashfs` at the computed image offset)
//! or DwarFS (extracted with `dwarfsextract`). Extraction always targets
//! a caller-owned scratch directory; the compatibility check never
//! writes extracted payloads to disk.

use crate::bundle::elf;
use crate::error::ExtractError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Environment override for the DwarFS tool directory.
pub const DWARFS_DIR_ENV: &str = "APP_MANAGER_DWARFS_DIR";

/// Maximum symlink hops while resolving an extracted entry.
const SYMLINK_HOP_LIMIT: usize = 5;

/// A ustar stream of this size or smaller contains no entries.
const EMPTY_TAR_SIZE: usize = 1024;

/// Subdirectory of the scratch dir receiving extracted trees.
const EXTRACT_ROOT: &str = "bundle-root";

/// Extracts launcher entries, icons and scripts out of bundles.
#[derive(Debug, Clone)]
pub struct BundleExtractor {
    cancel: CancellationToken,
}

impl BundleExtractor {
    /// Extractor whose subprocesses stop when `cancel` fires.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Extract the root-level launcher entry into `scratch`.
    pub async fn extract_launcher(
        &self,
        bundle: &Path,
        scratch: &Path,
    ) -> Result<PathBuf, ExtractError> {
        let root = self
            .extract_entries(bundle, scratch, &["*.desktop"])
            .await?;
        let found = find_root_entry(&root, |name| name.ends_with(".desktop")).ok_or_else(
            || ExtractError::LauncherMissing {
                bundle: bundle.to_path_buf(),
            },
        )?;
        self.resolve_symlinks(bundle, &root, found).await
    }

    /// Extract a root-level icon into `scratch`.
    ///
    /// PNG is preferred, then SVG, then the `.DirIcon` sentinel.
    pub async fn extract_icon(
        &self,
        bundle: &Path,
        scratch: &Path,
    ) -> Result<PathBuf, ExtractError> {
        let root = self
            .extract_entries(bundle, scratch, &["*.png", "*.svg", ".DirIcon"])
            .await?;
        let found = find_root_entry(&root, |name| name.ends_with(".png"))
            .or_else(|| find_root_entry(&root, |name| name.ends_with(".svg")))
            .or_else(|| find_root_entry(&root, |name| name == ".DirIcon"))
            .ok_or_else(|| ExtractError::IconMissing {
                bundle: bundle.to_path_buf(),
            })?;
        self.resolve_symlinks(bundle, &root, found).await
    }

    /// Extract the entry-point script, when the bundle has one.
    pub async fn extract_entry_point(
        &self,
        bundle: &Path,
        scratch: &Path,
    ) -> Result<Option<PathBuf>, ExtractError> {
        let root = self
            .extract_entries(bundle, scratch, &["AppRun", "AppRun.sh"])
            .await?;
        let found = find_root_entry(&root, |name| {
            name.eq_ignore_ascii_case("AppRun") || name.eq_ignore_ascii_case("AppRun.sh")
        });
        match found {
            Some(path) => Ok(Some(self.resolve_symlinks(bundle, &root, path).await?)),
            None => Ok(None),
        }
    }

    /// Version advertised by the bundle's AppStream metadata, if any.
    pub async fn extract_app_metadata_version(
        &self,
        bundle: &Path,
        scratch: &Path,
    ) -> Result<Option<String>, ExtractError> {
        let root = self
            .extract_entries(
                bundle,
                scratch,
                &[
                    "usr/share/metainfo/*.xml",
                    "usr/share/metainfo/*.appdata.xml",
                ],
            )
            .await?;
        let metainfo = root.join("usr/share/metainfo");
        for entry in walkdir::WalkDir::new(&metainfo)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|e| e.to_str()) != Some("xml") {
                continue;
            }
            if let Ok(text) = std::fs::read_to_string(entry.path()) {
                if let Some(version) = appstream_release_version(&text) {
                    return Ok(Some(version));
                }
            }
        }
        Ok(None)
    }

    /// Fast structural check: the bundle carries at least one launcher
    /// entry, one icon and an entry-point script.
    ///
    /// Never writes extracted payloads to disk; the SquashFS side uses
    /// the listing mode, the DwarFS side streams a tar and counts bytes.
    pub async fn check_compatibility(&self, bundle: &Path) -> bool {
        match self.squashfs_listing(bundle).await {
            Ok(listing) => {
                let names: Vec<&str> = listing
                    .lines()
                    .filter_map(root_listing_name)
                    .collect();
                return has_required_assets(&names);
            }
            Err(e) => log::debug!(
                "squashfs listing of {} failed, probing dwarfs: {e}",
                bundle.display()
            ),
        }

        for patterns in [&["*.desktop"][..], &["*.png", "*.svg", ".DirIcon"][..], &["AppRun"][..]] {
            if !self.dwarfs_probe(bundle, patterns).await {
                return false;
            }
        }
        true
    }

    /// Extract `patterns` into `<scratch>/bundle-root`, trying SquashFS
    /// first and falling back to DwarFS. Returns the extraction root.
    async fn extract_entries(
        &self,
        bundle: &Path,
        scratch: &Path,
        patterns: &[&str],
    ) -> Result<PathBuf, ExtractError> {
        if !bundle.exists() {
            return Err(ExtractError::NotFound {
                path: bundle.to_path_buf(),
            });
        }
        let root = scratch.join(EXTRACT_ROOT);
        std::fs::create_dir_all(&root).map_err(|e| ExtractError::ExtractionFailed {
            entry: patterns.join(","),
            bundle: bundle.to_path_buf(),
            reason: format!("creating extraction root: {e}"),
        })?;

        let squash_err = match self.unsquash(bundle, &root, patterns).await {
            Ok(()) => return Ok(root),
            Err(e) => e,
        };

        if let Some(tool) = dwarfs_tool() {
            let mut cmd = Command::new(tool);
            cmd.arg("-i")
                .arg(bundle)
                .arg("--image-offset=auto")
                .arg("-o")
                .arg(&root)
                .args(patterns);
            self.run_checked(cmd, "dwarfsextract", bundle, patterns)
                .await?;
            return Ok(root);
        }

        Err(squash_err)
    }

    async fn unsquash(
        &self,
        bundle: &Path,
        root: &Path,
        patterns: &[&str],
    ) -> Result<(), ExtractError> {
        let tool = squashfs_tool().ok_or_else(|| ExtractError::ExtractionFailed {
            entry: patterns.join(","),
            bundle: bundle.to_path_buf(),
            reason: "unsquashfs not found".to_string(),
        })?;
        let offset = elf::inspect(bundle)?.image_offset;
        let mut cmd = Command::new(tool);
        cmd.arg("-n")
            .arg("-f")
            .arg("-o")
            .arg(offset.to_string())
            .arg("-d")
            .arg(root)
            .arg(bundle)
            .args(patterns);
        self.run_checked(cmd, "unsquashfs", bundle, patterns).await
    }

    /// Follow symlinks inside the extraction root, re-extracting targets
    /// from the bundle, with a hop budget and a visited set.
    async fn resolve_symlinks(
        &self,
        bundle: &Path,
        root: &Path,
        mut current: PathBuf,
    ) -> Result<PathBuf, ExtractError> {
        fn entry_name(path: &Path) -> String {
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string()
        }
        let mut visited: HashSet<PathBuf> = HashSet::new();
        visited.insert(current.clone());

        for _ in 0..SYMLINK_HOP_LIMIT {
            let meta = std::fs::symlink_metadata(&current).map_err(|e| {
                ExtractError::ExtractionFailed {
                    entry: entry_name(&current),
                    bundle: bundle.to_path_buf(),
                    reason: format!("stat of extracted entry failed: {e}"),
                }
            })?;
            if !meta.file_type().is_symlink() {
                return Ok(current);
            }

            let target = std::fs::read_link(&current).map_err(|e| {
                ExtractError::ExtractionFailed {
                    entry: entry_name(&current),
                    bundle: bundle.to_path_buf(),
                    reason: format!("readlink failed: {e}"),
                }
            })?;
            let relative = normalize_link_target(&target).ok_or_else(|| {
                ExtractError::SymlinkEscape {
                    entry: target.display().to_string(),
                    bundle: bundle.to_path_buf(),
                }
            })?;

            let next = root.join(&relative);
            if !visited.insert(next.clone()) {
                return Err(ExtractError::SymlinkLoop {
                    entry: relative,
                    bundle: bundle.to_path_buf(),
                });
            }

            // The target may not have matched the original pattern; pull
            // it out of the image explicitly.
            if !next.exists() {
                self.extract_entries(bundle, root.parent().unwrap_or(root), &[relative.as_str()])
                    .await?;
            }
            if !next.exists() {
                return Err(ExtractError::ExtractionFailed {
                    entry: relative,
                    bundle: bundle.to_path_buf(),
                    reason: "symlink target missing from bundle".to_string(),
                });
            }
            current = next;
        }

        Err(ExtractError::SymlinkLimitExceeded {
            entry: entry_name(&current),
            bundle: bundle.to_path_buf(),
            limit: SYMLINK_HOP_LIMIT,
        })
    }

    async fn squashfs_listing(&self, bundle: &Path) -> Result<String, ExtractError> {
        let tool = squashfs_tool().ok_or_else(|| ExtractError::ExtractionFailed {
            entry: String::new(),
            bundle: bundle.to_path_buf(),
            reason: "unsquashfs not found".to_string(),
        })?;
        let offset = elf::inspect(bundle)?.image_offset;
        let mut cmd = Command::new(tool);
        cmd.arg("-l")
            .arg("-o")
            .arg(offset.to_string())
            .arg(bundle);
        let output = self.run(cmd, "unsquashfs", bundle).await?;
        if !output.status.success() {
            return Err(ExtractError::ExtractionFailed {
                entry: String::new(),
                bundle: bundle.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Stream `dwarfsextract -f ustar -o -` for `patterns` and report
    /// whether the tar carries more than the empty-archive trailer.
    async fn dwarfs_probe(&self, bundle: &Path, patterns: &[&str]) -> bool {
        let Some(tool) = dwarfs_tool() else {
            return false;
        };
        let mut cmd = Command::new(tool);
        cmd.arg("-i")
            .arg(bundle)
            .arg("--image-offset=auto")
            .arg("-f")
            .arg("ustar")
            .arg("-o")
            .arg("-")
            .args(patterns)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::debug!("dwarfs probe spawn failed: {e}");
                return false;
            }
        };
        let mut stdout = match child.stdout.take() {
            Some(s) => s,
            None => return false,
        };

        let mut seen = 0usize;
        let mut buf = [0u8; 4096];
        let matched = loop {
            let read = tokio::select! {
                r = stdout.read(&mut buf) => r,
                _ = self.cancel.cancelled() => break false,
            };
            match read {
                Ok(0) => break seen > EMPTY_TAR_SIZE,
                Ok(n) => {
                    seen += n;
                    if seen > EMPTY_TAR_SIZE {
                        break true;
                    }
                }
                Err(_) => break false,
            }
        };
        let _ = child.start_kill();
        let _ = child.wait().await;
        matched
    }

    async fn run_checked(
        &self,
        cmd: Command,
        tool: &str,
        bundle: &Path,
        patterns: &[&str],
    ) -> Result<(), ExtractError> {
        let output = self.run(cmd, tool, bundle).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ExtractError::ExtractionFailed {
                entry: patterns.join(","),
                bundle: bundle.to_path_buf(),
                reason: format!(
                    "{tool} exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }

    async fn run(
        &self,
        mut cmd: Command,
        tool: &str,
        bundle: &Path,
    ) -> Result<std::process::Output, ExtractError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let fail = |reason: String| ExtractError::ExtractionFailed {
            entry: String::new(),
            bundle: bundle.to_path_buf(),
            reason,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| fail(format!("spawning {tool}: {e}")))?;
        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let out_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let err_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| fail(format!("waiting for {tool}: {e}")))?
            }
            _ = self.cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(fail("cancelled".to_string()));
            }
        };

        Ok(std::process::Output {
            status,
            stdout: out_task.await.unwrap_or_default(),
            stderr: err_task.await.unwrap_or_default(),
        })
    }
}

/// Normalize a symlink target read from an extracted tree into a path
/// relative to the image root. Rejects parent-directory escapes.
fn normalize_link_target(target: &Path) -> Option<String> {
    use std::path::Component;
    let mut parts = Vec::new();
    for component in target.components() {
        match component {
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => return None,
            Component::Normal(part) => parts.push(part.to_str()?),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn find_root_entry(root: &Path, matches: impl Fn(&str) -> bool) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut names: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(&matches)
                .unwrap_or(false)
        })
        .collect();
    names.sort();
    names.into_iter().next()
}

/// Root-level entry name out of an `unsquashfs -l` listing line.
fn root_listing_name(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("squashfs-root/")?;
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

fn has_required_assets(names: &[&str]) -> bool {
    let has_launcher = names.iter().any(|n| n.ends_with(".desktop"));
    let has_icon = names
        .iter()
        .any(|n| n.ends_with(".png") || n.ends_with(".svg") || *n == ".DirIcon");
    let has_entry_point = names.iter().any(|n| {
        n.eq_ignore_ascii_case("AppRun") || n.eq_ignore_ascii_case("AppRun.sh")
    });
    has_launcher && has_icon && has_entry_point
}

/// Version attribute of the newest `<release>` element in AppStream XML.
fn appstream_release_version(xml: &str) -> Option<String> {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r#"<release[^>]*\bversion="([^"]+)""#).expect("static regex")
    });
    re.captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn squashfs_tool() -> Option<PathBuf> {
    if let Some(appdir) = std::env::var_os("APPDIR") {
        let bundled = PathBuf::from(appdir).join("usr/bin/unsquashfs");
        if bundled.is_file() {
            return Some(bundled);
        }
    }
    which::which("unsquashfs").ok()
}

/// Locate `dwarfsextract`, in order: env override, bundled directory,
/// well-known per-user dirs, ambient PATH. Absence is logged once per
/// process; later lookups fail silently.
pub fn dwarfs_tool() -> Option<PathBuf> {
    static MISSING_LOGGED: OnceLock<()> = OnceLock::new();

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = std::env::var_os(DWARFS_DIR_ENV) {
        candidates.push(PathBuf::from(dir).join("dwarfsextract"));
    }
    if let Some(appdir) = std::env::var_os("APPDIR") {
        candidates.push(PathBuf::from(appdir).join("usr/bin/dwarfsextract"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".local/bin/dwarfsextract"));
        candidates.push(home.join("bin/dwarfsextract"));
    }
    for candidate in candidates {
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    match which::which("dwarfsextract") {
        Ok(path) => Some(path),
        Err(_) => {
            MISSING_LOGGED.get_or_init(|| {
                log::info!("dwarfsextract not found; DwarFS bundles will be skipped");
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_target_normalization() {
        assert_eq!(
            normalize_link_target(Path::new("/usr/share/app.desktop")).as_deref(),
            Some("usr/share/app.desktop")
        );
        assert_eq!(
            normalize_link_target(Path::new("icons/app.png")).as_deref(),
            Some("icons/app.png")
        );
        assert_eq!(normalize_link_target(Path::new("../../etc/passwd")), None);
        assert_eq!(normalize_link_target(Path::new("/")), None);
    }

    #[test]
    fn listing_extracts_root_names_only() {
        let listing = "\
squashfs-root/hello.desktop
squashfs-root/hello.png
squashfs-root/AppRun
squashfs-root/usr/bin/hello
";
        let names: Vec<&str> = listing.lines().filter_map(root_listing_name).collect();
        assert_eq!(names, vec!["hello.desktop", "hello.png", "AppRun"]);
        assert!(has_required_assets(&names));
    }

    #[test]
    fn required_assets_all_present_or_fail() {
        assert!(!has_required_assets(&["hello.desktop", "AppRun"]));
        assert!(!has_required_assets(&["hello.png", "AppRun"]));
        assert!(has_required_assets(&["a.desktop", ".DirIcon", "apprun"]));
    }

    #[test]
    fn appstream_version_attribute() {
        let xml = r#"<component><releases>
            <release version="2.4.1" date="2025-01-01"/>
            <release version="2.4.0"/>
        </releases></component>"#;
        assert_eq!(appstream_release_version(xml).as_deref(), Some("2.4.1"));
        assert_eq!(appstream_release_version("<component/>"), None);
    }

    #[test]
    fn root_entry_lookup_prefers_sorted_first() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.desktop"), b"").unwrap();
        std::fs::write(tmp.path().join("a.desktop"), b"").unwrap();
        std::fs::write(tmp.path().join("other.txt"), b"").unwrap();
        let found = find_root_entry(tmp.path(), |n| n.ends_with(".desktop")).unwrap();
        assert_eq!(found.file_name().unwrap(), "a.desktop");
    }
}
