//! Command line interface for app-manager.
//!
//! Translates the fixed CLI verbs into engine calls and engine results
//! into exit codes and stderr messages. The richer surfaces (windows,
//! dialogs, drag-and-drop) live in the shell frontends and drive the
//! same engines.

mod args;
mod output;

pub use args::{Args, Invocation};
pub use output::OutputManager;

use crate::bundle::extract::BundleExtractor;
use crate::bundle::BundleMetadata;
use crate::daemon::BackgroundDaemon;
use crate::error::{AppError, InstallError, Result};
use crate::installer::Installer;
use crate::lock::BundleLock;
use crate::locations::{self, Locations};
use crate::registry::{InstallMode, Registry};
use crate::settings::SettingsStore;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Exit code for failed installs.
const EXIT_INSTALL_FAILED: i32 = 2;
/// Exit code when an uninstall target matches nothing.
const EXIT_UNINSTALL_NOT_FOUND: i32 = 3;
/// Exit code for failed uninstalls.
const EXIT_UNINSTALL_FAILED: i32 = 4;
/// Exit code for `--is-installed` on a missing bundle.
const EXIT_NOT_INSTALLED: i32 = 1;
/// Exit code for `--is-installed` errors.
const EXIT_QUERY_ERROR: i32 = 5;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse();
    let output = OutputManager::new(args.verbose, args.quiet);
    let locations = Locations::resolve();

    match args.invocation() {
        Invocation::Status => status(&output, &locations),
        Invocation::Inspect(path) => inspect(&output, &path).await,
        Invocation::Install(path) => install(&output, &locations, &path, &args).await,
        Invocation::Uninstall(target) => uninstall(&output, &locations, &target).await,
        Invocation::IsInstalled(path) => is_installed(&output, &locations, &path).await,
        Invocation::BackgroundUpdate => background_update(locations).await,
        Invocation::Invalid(what) => {
            output.error(&format!("unrecognized arguments: {what}"));
            Ok(EXIT_INSTALL_FAILED)
        }
    }
}

fn open_registry(locations: &Locations) -> Result<Registry> {
    Registry::load(locations.registry_file())
}

/// No-argument invocation. The GUI frontend activates its main window
/// here; the headless build prints a status summary.
fn status(output: &OutputManager, locations: &Locations) -> Result<i32> {
    let mut registry = open_registry(locations)?;
    let orphans = registry.reconcile_with_filesystem()?;
    for orphan in &orphans {
        output.warn(&format!(
            "'{}' disappeared from disk; its record was dropped",
            orphan.name
        ));
    }

    output.info(&format!(
        "{} bundle(s) installed, registry at {}",
        registry.len(),
        locations.registry_file().display()
    ));
    for record in registry.list() {
        output.record_line(&record);
    }

    if let Some(bundle) = locations::self_bundle_path() {
        output.verbose_println(&format!(
            "running from bundle {}; `app-manager install {}` integrates it",
            bundle.display(),
            bundle.display()
        ));
    }
    Ok(0)
}

/// Bare-path invocation. The GUI frontend opens its installer window;
/// the headless build inspects the bundle.
async fn inspect(output: &OutputManager, path: &Path) -> Result<i32> {
    let meta = BundleMetadata::read(path).await?;
    let compatible = BundleExtractor::new(CancellationToken::new())
        .check_compatibility(path)
        .await;

    output.info(&format!("{} ({})", meta.display_name, meta.digest));
    output.indent(&format!(
        "architecture: {}",
        meta.arch.as_deref().unwrap_or("unknown")
    ));
    if let Some(hint) = &meta.update_hint {
        output.indent(&format!("update hint: {hint}"));
    }
    if compatible {
        output.success("bundle looks installable");
    } else {
        output.warn("bundle is missing a desktop entry, icon or AppRun");
    }
    Ok(0)
}

async fn install(
    output: &OutputManager,
    locations: &Locations,
    path: &Path,
    args: &Args,
) -> Result<i32> {
    let mode = if args.extracted {
        InstallMode::Extracted
    } else {
        InstallMode::Portable
    };

    let _lock = match BundleLock::acquire(&locations.locks_dir(), path) {
        Ok(lock) => lock,
        Err(e) => {
            output.error(&format!("cannot start install: {e}"));
            return Ok(EXIT_INSTALL_FAILED);
        }
    };

    let mut registry = open_registry(locations)?;
    let installer = Installer::new(locations.clone());
    installer.migrate_uninstall_actions(&registry);
    let cancel = CancellationToken::new();

    // A bundle re-installed from the same place, or carrying the same
    // display name, replaces the existing record instead of sitting next
    // to it.
    let upgrade_target = registry
        .lookup_by_source_path(path)
        .map(|r| r.id.clone())
        .or_else(|| {
            let name = crate::bundle::display_name_from_filename(
                path.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            );
            registry
                .list()
                .into_iter()
                .find(|r| r.name == name && r.mode == mode)
                .map(|r| r.id)
        });

    let result = match upgrade_target {
        Some(id) => installer.upgrade(&mut registry, &id, path, cancel).await,
        None => installer.install(&mut registry, path, mode, cancel).await,
    };

    match result {
        Ok(record) => {
            output.success(&format!(
                "installed '{}' to {}",
                record.effective_name(),
                record.installed_path.display()
            ));
            output.verbose_println(&format!("launcher: {}", record.desktop_file.display()));
            Ok(0)
        }
        Err(e) => {
            output.error(&e.to_string());
            Ok(EXIT_INSTALL_FAILED)
        }
    }
}

async fn uninstall(output: &OutputManager, locations: &Locations, target: &str) -> Result<i32> {
    let mut registry = open_registry(locations)?;
    let installer = Installer::new(locations.clone());
    installer.migrate_uninstall_actions(&registry);

    let Some(id) = installer.resolve_target(&registry, target) else {
        output.error(&format!("no installed bundle matches '{target}'"));
        return Ok(EXIT_UNINSTALL_NOT_FOUND);
    };

    match installer.uninstall(&mut registry, &id).await {
        Ok(()) => {
            output.success(&format!("uninstalled '{target}'"));
            Ok(0)
        }
        Err(AppError::Install(InstallError::TargetNotFound { .. })) => {
            Ok(EXIT_UNINSTALL_NOT_FOUND)
        }
        Err(e) => {
            output.error(&e.to_string());
            Ok(EXIT_UNINSTALL_FAILED)
        }
    }
}

async fn is_installed(
    output: &OutputManager,
    locations: &Locations,
    path: &Path,
) -> Result<i32> {
    let registry = match open_registry(locations) {
        Ok(r) => r,
        Err(e) => {
            output.error(&e.to_string());
            return Ok(EXIT_QUERY_ERROR);
        }
    };
    match BundleMetadata::read(path).await {
        Ok(meta) if registry.is_installed(&meta.digest) => {
            output.println("installed");
            Ok(0)
        }
        Ok(_) => {
            output.println("missing");
            Ok(EXIT_NOT_INSTALLED)
        }
        Err(e) => {
            output.error(&e.to_string());
            Ok(EXIT_QUERY_ERROR)
        }
    }
}

async fn background_update(locations: Locations) -> Result<i32> {
    locations.ensure()?;
    let settings = SettingsStore::load(locations.settings_file());
    let registry = Arc::new(Mutex::new(open_registry(&locations)?));

    // External deletions observed while the daemon runs are reconciled
    // on this loop, exactly like in the foreground process.
    match crate::monitor::FilesystemMonitor::start(&locations, registry.clone()) {
        Ok(mut monitor) => {
            let watched = registry.clone();
            tokio::spawn(async move {
                while let Some(change) = monitor.next_change().await {
                    log::info!("reconciling after deletion of {}", change.path.display());
                    let mut registry = watched.lock().await;
                    if let Err(e) = registry.reconcile_with_filesystem() {
                        log::warn!("reconcile failed: {e}");
                    }
                }
            });
        }
        Err(e) => log::warn!("filesystem monitor unavailable: {e}"),
    }

    BackgroundDaemon::new(locations, registry, settings)
        .run()
        .await?;
    Ok(0)
}
