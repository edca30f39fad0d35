//! Per-bundle process locks.
//!
//! Two instances of the tool must not open an install flow for the same
//! bundle concurrently. Each bundle-opening code path takes a lock file
//! named after the MD5 of the bundle path, containing the holder's PID.
//! A stale lock (dead PID) is taken over; a live one is an error. The
//! lock is released when the guard drops.

use crate::error::LockError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// RAII guard over one bundle's lock file.
#[derive(Debug)]
pub struct BundleLock {
    path: PathBuf,
}

impl BundleLock {
    /// Take the lock for `bundle` under `locks_dir`.
    ///
    /// Fails with [`LockError::Held`] while the recorded PID is alive.
    pub fn acquire(locks_dir: &Path, bundle: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(locks_dir).map_err(|e| LockError::Io {
            path: locks_dir.to_path_buf(),
            reason: format!("creating locks dir: {e}"),
        })?;
        let path = locks_dir.join(lock_file_name(bundle));

        if let Ok(contents) = fs::read_to_string(&path) {
            if let Ok(pid) = contents.trim().parse::<u32>() {
                if pid != std::process::id() && pid_is_alive(pid) {
                    return Err(LockError::Held { pid });
                }
                log::debug!("taking over stale lock {} (pid {pid})", path.display());
            }
        }

        let mut file = fs::File::create(&path).map_err(|e| LockError::Io {
            path: path.clone(),
            reason: format!("creating lock file: {e}"),
        })?;
        write!(file, "{}", std::process::id()).map_err(|e| LockError::Io {
            path: path.clone(),
            reason: format!("writing pid: {e}"),
        })?;

        Ok(Self { path })
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BundleLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to release lock {}: {e}", self.path.display());
            }
        }
    }
}

/// Lock file name for a bundle path.
fn lock_file_name(bundle: &Path) -> String {
    let digest = md5::compute(bundle.to_string_lossy().as_bytes());
    format!("drop-window-{digest:x}.lock")
}

/// Signal-0 liveness probe.
#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    false
}
