//! Installation engine.
//!
//! Orchestrates fresh installs, in-place upgrades and uninstalls on top
//! of the asset extractor, the bundle metadata reader, the launcher-entry
//! model and the registry. The registry handle is passed in explicitly by
//! whoever drives an operation.

pub mod trash;

use crate::bundle::extract::BundleExtractor;
use crate::bundle::BundleMetadata;
use crate::desktop::{exec, DesktopEntry, MAIN_GROUP};
use crate::error::{InstallError, Result};
use crate::locations::{in_flatpak_sandbox, Locations};
use crate::registry::{InstallMode, InstallationRecord, Registry};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Launcher keys carried across an upgrade.
pub const PRESERVED_LAUNCHER_KEYS: &[&str] = &[
    "X-AppImage-Homepage",
    "X-AppImage-UpdateURL",
    "Keywords",
    "StartupWMClass",
    "NoDisplay",
    "Terminal",
];

/// Group holding the uninstall desktop action.
const UNINSTALL_GROUP: &str = "Desktop Action Uninstall";

/// The installation engine.
#[derive(Debug, Clone)]
pub struct Installer {
    locations: Locations,
}

/// Files created so far by an install, undone on failure.
#[derive(Debug, Default)]
struct Cleanup {
    /// Portable installs move the user's bundle; failure moves it back.
    restore_move: Option<(PathBuf, PathBuf)>,
    remove_files: Vec<PathBuf>,
    remove_dirs: Vec<PathBuf>,
}

impl Cleanup {
    fn run(&mut self) {
        for file in self.remove_files.drain(..) {
            if let Err(e) = std::fs::remove_file(&file) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("cleanup could not remove {}: {e}", file.display());
                }
            }
        }
        for dir in self.remove_dirs.drain(..) {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("cleanup could not remove {}: {e}", dir.display());
                }
            }
        }
        if let Some((from, to)) = self.restore_move.take() {
            if from.exists() && !to.exists() {
                if let Err(e) = std::fs::rename(&from, &to) {
                    log::warn!(
                        "cleanup could not move {} back to {}: {e}",
                        from.display(),
                        to.display()
                    );
                }
            }
        }
    }
}

impl Installer {
    /// Engine writing into `locations`.
    pub fn new(locations: Locations) -> Self {
        Self { locations }
    }

    /// Install `bundle` in `mode`.
    pub async fn install(
        &self,
        registry: &mut Registry,
        bundle: &Path,
        mode: InstallMode,
        cancel: CancellationToken,
    ) -> Result<InstallationRecord> {
        self.install_inner(registry, bundle, mode, None, false, cancel)
            .await
    }

    /// Replace the installed bundle of `id` with `new_bundle`, keeping
    /// the user's launcher customizations and install timestamp.
    pub async fn upgrade(
        &self,
        registry: &mut Registry,
        id: &str,
        new_bundle: &Path,
        cancel: CancellationToken,
    ) -> Result<InstallationRecord> {
        let old = registry
            .lookup_by_digest(id)
            .cloned()
            .ok_or_else(|| InstallError::TargetNotFound {
                target: id.to_string(),
            })?;

        let preserved = preserved_properties(&DesktopEntry::load(&old.desktop_file));
        self.uninstall(registry, &old.id).await?;

        let mut record = self
            .install_inner(
                registry,
                new_bundle,
                old.mode,
                Some(preserved),
                true,
                cancel,
            )
            .await?;

        // Continuity of the record across the replace.
        record.installed_at = old.installed_at;
        record.updated_at = Some(chrono::Utc::now().timestamp_millis());
        record.custom_exec_args = old.custom_exec_args.clone();
        record.custom_keywords = old.custom_keywords.clone();
        record.custom_wm_class = old.custom_wm_class.clone();
        record.custom_display_name = old.custom_display_name.clone();
        record.custom_update_url = old.custom_update_url.clone();
        record.custom_homepage = old.custom_homepage.clone();
        registry.update(record.clone(), false)?;
        registry.persist(false)?;
        Ok(record)
    }

    /// Uninstall the record with digest `id`.
    ///
    /// Installed files go away first (trash for portable files, recursive
    /// removal for extracted trees); the registry entry is dropped even
    /// when file removal partially fails, and the failure is reported.
    pub async fn uninstall(&self, registry: &mut Registry, id: &str) -> Result<()> {
        let record = registry
            .lookup_by_digest(id)
            .cloned()
            .ok_or_else(|| InstallError::TargetNotFound {
                target: id.to_string(),
            })?;

        let mut problems: Vec<String> = Vec::new();

        match record.mode {
            InstallMode::Portable => {
                if record.installed_path.exists() {
                    if let Err(e) =
                        trash::move_to_trash(&self.locations.trash_dir, &record.installed_path)
                    {
                        problems.push(format!("trashing installed file: {e}"));
                    }
                }
            }
            InstallMode::Extracted => {
                if record.installed_path.exists() {
                    if let Err(e) = std::fs::remove_dir_all(&record.installed_path) {
                        problems.push(format!("removing installed tree: {e}"));
                    }
                }
            }
        }

        for stale in [Some(&record.desktop_file), Some(&record.icon_path), record.bin_symlink.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = std::fs::remove_file(stale) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    problems.push(format!("removing {}: {e}", stale.display()));
                }
            }
        }

        // The record goes away even when file removal partially failed.
        registry.unregister(&record.id)?;
        registry.persist(false)?;

        if problems.is_empty() {
            Ok(())
        } else {
            Err(InstallError::UninstallFailed {
                name: record.name,
                reason: problems.join("; "),
            }
            .into())
        }
    }

    /// Resolve an uninstall target given as a digest or a path.
    pub fn resolve_target(&self, registry: &Registry, target: &str) -> Option<String> {
        if let Some(record) = registry.lookup_by_digest(target) {
            return Some(record.id.clone());
        }
        let path = Path::new(target);
        registry
            .lookup_by_installed_path(path)
            .or_else(|| registry.lookup_by_source_path(path))
            .map(|r| r.id.clone())
    }

    /// Rewrite every record's uninstall action so its `Exec` matches the
    /// current self-invocation. Failures are warnings, never errors.
    pub fn migrate_uninstall_actions(&self, registry: &Registry) {
        let self_exec = resolve_self_invocation();
        for record in registry.list() {
            if !record.desktop_file.exists() {
                continue;
            }
            let mut entry = DesktopEntry::load(&record.desktop_file);
            if entry.get_in(UNINSTALL_GROUP, "Exec").is_none() {
                continue;
            }
            entry.set_in(
                UNINSTALL_GROUP,
                "Exec",
                &uninstall_action_exec(&self_exec, &record.installed_path),
            );
            if let Err(e) = entry.save(&record.desktop_file) {
                log::warn!(
                    "could not migrate uninstall action of {}: {e}",
                    record.desktop_file.display()
                );
            }
        }
    }

    async fn install_inner(
        &self,
        registry: &mut Registry,
        bundle: &Path,
        mode: InstallMode,
        preserved: Option<BTreeMap<String, String>>,
        upgrading: bool,
        cancel: CancellationToken,
    ) -> Result<InstallationRecord> {
        let meta = BundleMetadata::read(bundle).await?;
        if !meta.arch_compatible() {
            return Err(InstallError::ArchMismatch {
                bundle_arch: meta.arch.clone().unwrap_or_default(),
                host_arch: crate::bundle::host_arch().to_string(),
            }
            .into());
        }
        if !upgrading {
            if let Some(existing) = registry.lookup_by_digest(&meta.digest) {
                return Err(InstallError::AlreadyInstalled {
                    digest: existing.id.clone(),
                    name: existing.name.clone(),
                }
                .into());
            }
        }

        self.locations.ensure()?;
        let scratch = tempfile::Builder::new()
            .prefix("appmgr-install-")
            .tempdir()?;

        let mut cleanup = Cleanup::default();
        let result = self
            .install_steps(
                registry,
                &meta,
                mode,
                preserved,
                scratch.path(),
                &mut cleanup,
                cancel,
            )
            .await;
        match result {
            Ok(record) => Ok(record),
            Err(e) => {
                cleanup.run();
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn install_steps(
        &self,
        registry: &mut Registry,
        meta: &BundleMetadata,
        mode: InstallMode,
        preserved: Option<BTreeMap<String, String>>,
        scratch: &Path,
        cleanup: &mut Cleanup,
        cancel: CancellationToken,
    ) -> Result<InstallationRecord> {
        let extractor = BundleExtractor::new(cancel.clone());

        // Launcher and icon come out of the image before any move, so a
        // broken bundle fails before touching the applications dir.
        let launcher_path = extractor.extract_launcher(&meta.path, scratch).await?;
        let icon_path = extractor.extract_icon(&meta.path, scratch).await?;
        let launcher = DesktopEntry::load(&launcher_path);

        let display_name = launcher
            .get("Name")
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| meta.display_name.clone());
        let slug = {
            let s = slugify(&display_name);
            if s.is_empty() {
                meta.sanitized_stem.to_lowercase()
            } else {
                s
            }
        };
        let version = match launcher.effective_version() {
            Some(v) => Some(v),
            None => extractor
                .extract_app_metadata_version(&meta.path, scratch)
                .await
                .unwrap_or_default(),
        };

        // Place the artifact under its final name.
        let installed_path = match mode {
            InstallMode::Portable => {
                let target = unique_path(&self.locations.apps_dir.join(&display_name));
                move_file(&meta.path, &target).map_err(|e| InstallError::StepFailed {
                    step: "moving bundle into applications dir",
                    path: target.clone(),
                    reason: e.to_string(),
                })?;
                cleanup.restore_move = Some((target.clone(), meta.path.clone()));
                let mut perms = std::fs::metadata(&target)?.permissions();
                perms.set_mode(perms.mode() | 0o755);
                std::fs::set_permissions(&target, perms)?;
                target
            }
            InstallMode::Extracted => {
                let tree = self
                    .self_extract(meta, scratch, &cancel)
                    .await?;
                if !tree.join("AppRun").exists() && !tree.join("AppRun.sh").exists() {
                    return Err(crate::error::ExtractError::EntryPointMissing {
                        bundle: meta.path.clone(),
                    }
                    .into());
                }
                let target = unique_path(&self.locations.extracted_dir.join(&slug));
                move_dir(&tree, &target).map_err(|e| InstallError::StepFailed {
                    step: "moving extracted tree into place",
                    path: target.clone(),
                    reason: e.to_string(),
                })?;
                cleanup.remove_dirs.push(target.clone());
                target
            }
        };

        // Resolve the executable the launcher should point at.
        let original_exec = launcher.get("Exec").unwrap_or_default().to_string();
        let exec_args = exec::exec_remainder(&original_exec);
        let resolved_exec = match mode {
            InstallMode::Portable => installed_path.clone(),
            InstallMode::Extracted => {
                resolve_extracted_exec(&installed_path, &original_exec)
            }
        };

        // Icon into the user icons dir, named for the launcher.
        let icon_stem = icon_path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty() && *s != ".DirIcon")
            .map(str::to_string)
            .unwrap_or_else(|| slug.clone());
        let icon_ext = icon_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png");
        let installed_icon = self
            .locations
            .icons_dir
            .join(format!("{icon_stem}.{icon_ext}"));
        std::fs::copy(&icon_path, &installed_icon).map_err(|e| InstallError::StepFailed {
            step: "installing icon",
            path: installed_icon.clone(),
            reason: e.to_string(),
        })?;
        cleanup.remove_files.push(installed_icon.clone());

        // Generate the launcher entry.
        let desktop_file = self
            .locations
            .launchers_dir
            .join(format!("appmanager-{slug}.desktop"));
        let mut generated = launcher.clone();
        generated.set("Exec", &quoted_exec(&resolved_exec, &exec_args));
        generated.set("Icon", &icon_stem);
        if let Some(v) = &version {
            generated.set("X-AppImage-Version", v);
        }
        if let Some(map) = &preserved {
            for (key, value) in map {
                generated.set(key, value);
            }
        }
        append_uninstall_action(&mut generated, &installed_path);
        let terminal = generated.is_terminal();
        if terminal {
            generated.set("NoDisplay", "true");
        }
        generated
            .save(&desktop_file)
            .map_err(|e| InstallError::StepFailed {
                step: "writing launcher entry",
                path: desktop_file.clone(),
                reason: e.to_string(),
            })?;
        cleanup.remove_files.push(desktop_file.clone());

        // Terminal apps get a PATH symlink instead of a menu entry.
        let bin_symlink = if terminal {
            let link = self.locations.bin_dir.join(&slug);
            let _ = std::fs::remove_file(&link);
            std::os::unix::fs::symlink(&resolved_exec, &link).map_err(|e| {
                InstallError::StepFailed {
                    step: "creating PATH symlink",
                    path: link.clone(),
                    reason: e.to_string(),
                }
            })?;
            cleanup.remove_files.push(link.clone());
            Some(link)
        } else {
            None
        };

        let update_url = launcher
            .get("X-AppImage-UpdateURL")
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| meta.update_hint.clone());
        let zsync_update_info = update_url
            .as_deref()
            .filter(|u| u.starts_with("zsync|") || u.starts_with("gh-releases-zsync|"))
            .map(str::to_string);

        let mut record = InstallationRecord {
            id: meta.digest.clone(),
            name: display_name.clone(),
            mode,
            source_checksum: meta.digest.clone(),
            source_path: meta.path.clone(),
            installed_path,
            desktop_file,
            icon_path: installed_icon,
            bin_symlink,
            installed_at: chrono::Utc::now().timestamp_millis(),
            updated_at: None,
            version,
            last_modified: None,
            content_length: None,
            last_release_tag: None,
            zsync_update_info,
            original_exec_args: non_empty(exec_args),
            custom_exec_args: None,
            original_keywords: launcher.get("Keywords").and_then(|v| non_empty(v.to_string())),
            custom_keywords: None,
            original_wm_class: launcher
                .get("StartupWMClass")
                .and_then(|v| non_empty(v.to_string())),
            custom_wm_class: None,
            original_display_name: Some(display_name),
            custom_display_name: None,
            original_update_url: update_url,
            custom_update_url: None,
            original_homepage: launcher
                .get("X-AppImage-Homepage")
                .and_then(|v| non_empty(v.to_string())),
            custom_homepage: None,
        };

        // Reinstalling an app by name restores earlier customizations.
        if let Some(history) = registry.lookup_history(&record.name).cloned() {
            record.apply_history(&history);
        }

        registry.register(record.clone());
        registry.persist(false)?;
        Ok(record)
    }

    /// Unpack the bundle with its self-extract mode into the scratch dir
    /// and return the resulting tree.
    async fn self_extract(
        &self,
        meta: &BundleMetadata,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        // Self-extraction executes the bundle; an unexecutable source is
        // first copied into scratch and flagged.
        let runner = if meta.executable {
            meta.path.clone()
        } else {
            let copy = scratch.join("bundle-to-extract");
            std::fs::copy(&meta.path, &copy)?;
            let mut perms = std::fs::metadata(&copy)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&copy, perms)?;
            copy
        };

        let stage = scratch.join("stage");
        std::fs::create_dir_all(&stage)?;

        let mut child = Command::new(&runner)
            .arg("--appimage-extract")
            .current_dir(&stage)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InstallError::SelfExtractFailed {
                bundle: meta.path.clone(),
                reason: format!("spawn failed: {e}"),
            })?;

        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let err_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| InstallError::SelfExtractFailed {
                bundle: meta.path.clone(),
                reason: format!("wait failed: {e}"),
            })?,
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(InstallError::SelfExtractFailed {
                    bundle: meta.path.clone(),
                    reason: "cancelled".to_string(),
                }
                .into());
            }
        };
        if !status.success() {
            let stderr = err_task.await.unwrap_or_default();
            return Err(InstallError::SelfExtractFailed {
                bundle: meta.path.clone(),
                reason: format!(
                    "exit {}: {}",
                    status,
                    String::from_utf8_lossy(&stderr).trim()
                ),
            }
            .into());
        }

        let tree = stage.join("squashfs-root");
        if !tree.is_dir() {
            return Err(InstallError::SelfExtractFailed {
                bundle: meta.path.clone(),
                reason: "no squashfs-root produced".to_string(),
            }
            .into());
        }
        Ok(tree)
    }
}

/// URL-safe slug of a display name: lower-cased, `[a-z0-9]` kept,
/// everything else collapsed to single underscores.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        let lower = c.to_ascii_lowercase();
        if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
            slug.push(lower);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    slug.trim_matches('_').to_string()
}

/// First non-colliding variant of `path` (`name`, `name 2`, `name 3`...).
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("installed");
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut counter = 2;
    loop {
        let candidate = parent.join(format!("{name} {counter}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// The `<self>` portion of generated uninstall actions: `flatpak run`
/// inside a sandbox, the ambient binary when on PATH, `/proc/self/exe`
/// as a concrete fallback, and the bare name as a last resort.
pub fn resolve_self_invocation() -> String {
    if in_flatpak_sandbox() {
        let app_id = std::env::var("FLATPAK_ID")
            .unwrap_or_else(|_| "com.github.AppManager".to_string());
        return format!("flatpak run {app_id}");
    }
    if let Ok(path) = which::which("app-manager") {
        return path.display().to_string();
    }
    if Path::new("/proc/self/exe").exists() {
        return "/proc/self/exe".to_string();
    }
    "app-manager".to_string()
}

fn uninstall_action_exec(self_exec: &str, installed_path: &Path) -> String {
    format!("{self_exec} --uninstall \"{}\"", installed_path.display())
}

fn append_uninstall_action(entry: &mut DesktopEntry, installed_path: &Path) {
    let mut actions = entry
        .get_in(MAIN_GROUP, "Actions")
        .unwrap_or_default()
        .to_string();
    if !actions.split(';').any(|a| a == "Uninstall") {
        if !actions.is_empty() && !actions.ends_with(';') {
            actions.push(';');
        }
        actions.push_str("Uninstall;");
    }
    entry.set("Actions", &actions);
    entry.set_in(UNINSTALL_GROUP, "Name", "Uninstall");
    entry.set_in(
        UNINSTALL_GROUP,
        "Exec",
        &uninstall_action_exec(&resolve_self_invocation(), installed_path),
    );
}

fn quoted_exec(exec: &Path, args: &str) -> String {
    if args.is_empty() {
        format!("\"{}\"", exec.display())
    } else {
        format!("\"{}\" {args}", exec.display())
    }
}

/// Extracted mode launches the real binary, not the generic entry point,
/// whenever the `BIN=` hint in AppRun names one.
fn resolve_extracted_exec(tree: &Path, original_exec: &str) -> PathBuf {
    if let Some(token) = exec::first_exec_token(original_exec) {
        if !exec::is_entry_point_token(&token) {
            let candidate = tree.join(exec::strip_appdir_prefix(&token));
            if candidate.is_file() {
                return candidate;
            }
        }
    }

    let apprun = tree.join("AppRun");
    if let Ok(script) = std::fs::read_to_string(&apprun) {
        if let Some(bin_name) = exec::parse_bin_assignment(&script) {
            let preferred = tree.join("usr/bin").join(&bin_name);
            if preferred.is_file() {
                return preferred;
            }
            for entry in walkdir::WalkDir::new(tree)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file()
                    && entry.file_name().to_string_lossy() == bin_name.as_str()
                {
                    return entry.path().to_path_buf();
                }
            }
        }
    }
    apprun
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            // Source on another filesystem; copy and drop the original.
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

fn move_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_tree(from, to)?;
            std::fs::remove_dir_all(from)
        }
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in walkdir::WalkDir::new(from) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let dest = to.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())?;
            let _ = std::fs::remove_file(&dest);
            std::os::unix::fs::symlink(target, &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Capture the launcher fields an upgrade must carry over.
pub fn preserved_properties(entry: &DesktopEntry) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for key in PRESERVED_LAUNCHER_KEYS {
        if let Some(value) = entry.get(key) {
            if !value.is_empty() {
                map.insert((*key).to_string(), value.to_string());
            }
        }
    }
    map
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_runs_and_trim_edges() {
        assert_eq!(slugify("Hello World"), "hello_world");
        assert_eq!(slugify("GIMP 2.10 (stable)"), "gimp_2_10_stable");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("Édition"), "dition");
    }

    #[test]
    fn unique_path_counts_upward() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("App");
        assert_eq!(unique_path(&base), base);
        std::fs::write(&base, b"x").unwrap();
        assert_eq!(unique_path(&base), tmp.path().join("App 2"));
        std::fs::write(tmp.path().join("App 2"), b"x").unwrap();
        assert_eq!(unique_path(&base), tmp.path().join("App 3"));
    }

    #[test]
    fn preserved_properties_skips_missing_and_empty() {
        let entry = DesktopEntry::parse(
            "[Desktop Entry]\nName=A\nKeywords=K;\nTerminal=true\nStartupWMClass=\n",
        );
        let map = preserved_properties(&entry);
        assert_eq!(map.get("Keywords").map(String::as_str), Some("K;"));
        assert_eq!(map.get("Terminal").map(String::as_str), Some("true"));
        assert!(!map.contains_key("StartupWMClass"));
        assert!(!map.contains_key("X-AppImage-Homepage"));
    }

    #[test]
    fn uninstall_action_lands_in_launcher() {
        let mut entry = DesktopEntry::parse("[Desktop Entry]\nName=A\nExec=a\n");
        append_uninstall_action(&mut entry, Path::new("/apps/A"));
        let text = entry.serialize();
        assert!(text.contains("Actions=Uninstall;"));
        assert!(text.contains("[Desktop Action Uninstall]"));
        assert!(text.contains("--uninstall \"/apps/A\""));

        // Appending twice keeps a single Uninstall action.
        append_uninstall_action(&mut entry, Path::new("/apps/A"));
        assert_eq!(entry.get("Actions"), Some("Uninstall;"));
    }

    #[test]
    fn uninstall_action_appends_to_existing_actions() {
        let mut entry =
            DesktopEntry::parse("[Desktop Entry]\nName=A\nExec=a\nActions=New;\n");
        append_uninstall_action(&mut entry, Path::new("/apps/A"));
        assert_eq!(entry.get("Actions"), Some("New;Uninstall;"));
    }

    #[test]
    fn quoting_preserves_arguments() {
        assert_eq!(
            quoted_exec(Path::new("/apps/Hello World"), "%U"),
            "\"/apps/Hello World\" %U"
        );
        assert_eq!(quoted_exec(Path::new("/apps/a"), ""), "\"/apps/a\"");
    }

    #[test]
    fn extracted_exec_prefers_launcher_token_then_bin_hint() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = tmp.path();
        std::fs::create_dir_all(tree.join("usr/bin")).unwrap();
        std::fs::write(tree.join("usr/bin/realbin"), b"").unwrap();
        std::fs::write(
            tree.join("AppRun"),
            "#!/bin/sh\nBIN=\"$APPDIR/usr/bin/realbin\"\nexec \"$BIN\" \"$@\"\n",
        )
        .unwrap();

        // AppRun-ish Exec resolves through the BIN hint.
        assert_eq!(
            resolve_extracted_exec(tree, "AppRun %U"),
            tree.join("usr/bin/realbin")
        );
        // A concrete relative token wins outright.
        assert_eq!(
            resolve_extracted_exec(tree, "$APPDIR/usr/bin/realbin %U"),
            tree.join("usr/bin/realbin")
        );
        // No hint at all falls back to the entry point.
        std::fs::write(tree.join("AppRun"), "#!/bin/sh\nexec ./something\n").unwrap();
        assert_eq!(resolve_extracted_exec(tree, "AppRun"), tree.join("AppRun"));
    }

    #[test]
    fn move_file_falls_back_to_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("nested/dst");
        std::fs::write(&src, b"payload").unwrap();
        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }
}
