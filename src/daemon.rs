//! Background update daemon.
//!
//! A long-lived loop entered through the `--background-update` CLI verb.
//! The policy gate is user settings: with auto-check disabled the daemon
//! exits immediately; otherwise it wakes on a fixed short interval and
//! runs a full update pass whenever the configured check interval has
//! elapsed since the last one. Nothing in the loop is allowed to crash
//! the process; every failure is logged and the loop keeps ticking.

use crate::desktop::DesktopEntry;
use crate::error::Result;
use crate::installer::resolve_self_invocation;
use crate::locations::Locations;
use crate::registry::Registry;
use crate::settings::SettingsStore;
use crate::update::{UpdateEngine, UpdateStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Fixed sleep between daemon wakeups, in seconds.
pub const WAKE_INTERVAL_SECS: u64 = 3600;

/// The background daemon.
pub struct BackgroundDaemon {
    locations: Locations,
    registry: Arc<Mutex<Registry>>,
    settings: SettingsStore,
}

impl BackgroundDaemon {
    /// Daemon over the given state.
    pub fn new(
        locations: Locations,
        registry: Arc<Mutex<Registry>>,
        settings: SettingsStore,
    ) -> Self {
        Self {
            locations,
            registry,
            settings,
        }
    }

    /// Run forever (or exit immediately when auto-check is disabled).
    pub async fn run(mut self) -> Result<()> {
        if !self.settings.get().auto_check_enabled {
            log::info!("automatic update checks are disabled, exiting");
            return Ok(());
        }
        log::info!(
            "background daemon running, check interval {}s",
            self.settings.get().check_interval_secs
        );

        loop {
            self.tick().await;
            tokio::time::sleep(Duration::from_secs(WAKE_INTERVAL_SECS)).await;
        }
    }

    /// One wakeup: run a check when it is due, never propagate failures.
    async fn tick(&mut self) {
        let now = chrono::Utc::now().timestamp_millis();
        let settings = self.settings.get();
        if !check_due(settings.last_check, settings.check_interval_secs, now) {
            log::debug!("update check not due yet");
            return;
        }

        // The foreground process may have mutated the registry since the
        // last wakeup; work from the freshest state on disk.
        {
            let mut registry = self.registry.lock().await;
            if let Err(e) = registry.reload(false) {
                log::warn!("registry reload failed, using in-memory state: {e}");
            }
        }

        let engine = UpdateEngine::new(self.locations.clone(), self.registry.clone());
        let outcomes = engine.update_all().await;
        let updated = outcomes
            .iter()
            .filter(|o| o.status == UpdateStatus::Updated)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| o.status == UpdateStatus::Failed)
            .count();
        log::info!(
            "update pass finished: {} updated, {} failed, {} skipped",
            updated,
            failed,
            outcomes.len() - updated - failed
        );

        if let Err(e) = self.settings.update(|s| s.last_check = Some(now)) {
            log::warn!("could not persist last-check timestamp: {e}");
        }
    }
}

/// Whether a check is due at `now_ms`.
pub fn check_due(last_check_ms: Option<i64>, interval_secs: u64, now_ms: i64) -> bool {
    match last_check_ms {
        None => true,
        Some(last) => now_ms.saturating_sub(last) >= (interval_secs as i64) * 1000,
    }
}

/// Write the autostart launcher starting the daemon at session login.
pub fn write_autostart(locations: &Locations) -> Result<()> {
    let mut entry = DesktopEntry::default();
    entry.set("Type", "Application");
    entry.set("Name", "App Manager Updater");
    entry.set(
        "Exec",
        &format!("{} --background-update", resolve_self_invocation()),
    );
    entry.set("NoDisplay", "true");
    entry.set("X-GNOME-Autostart-enabled", "true");
    entry.save(&locations.autostart_file())?;
    Ok(())
}

/// Remove the autostart launcher, if present.
pub fn remove_autostart(locations: &Locations) -> Result<()> {
    match std::fs::remove_file(locations.autostart_file()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// One-shot background authorization: the desktop portal "background"
/// permission is requested at most once per installation, tracked by the
/// `background_permission_asked` settings bit. The request itself is the
/// shell frontend's job; the engine records the ask and installs the
/// autostart entry.
pub fn ensure_background_permission(
    settings: &mut SettingsStore,
    locations: &Locations,
) -> Result<bool> {
    if settings.get().background_permission_asked {
        return Ok(false);
    }
    write_autostart(locations)?;
    settings.update(|s| s.background_permission_asked = true)?;
    Ok(true)
}
