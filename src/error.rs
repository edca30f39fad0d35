//! Error types for app-manager operations.
//!
//! This module defines all error types with actionable error messages,
//! grouped by the subsystem that produces them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for app-manager operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Main error type for all app-manager operations
#[derive(Error, Debug)]
pub enum AppError {
    /// Bundle asset extraction errors
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Installation engine errors
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Registry persistence errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Update engine errors
    #[error("Update error: {0}")]
    Update(#[from] UpdateError),

    /// Process lock errors
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Asset extraction errors
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Bundle file does not exist
    #[error("Bundle not found at {path}")]
    NotFound {
        /// Path that was probed
        path: PathBuf,
    },

    /// No launcher entry at the bundle root
    #[error("Bundle '{bundle}' contains no desktop entry")]
    LauncherMissing {
        /// Bundle path
        bundle: PathBuf,
    },

    /// No icon at the bundle root
    #[error("Bundle '{bundle}' contains no icon")]
    IconMissing {
        /// Bundle path
        bundle: PathBuf,
    },

    /// No entry-point script at the bundle root
    #[error("Bundle '{bundle}' contains no AppRun entry point")]
    EntryPointMissing {
        /// Bundle path
        bundle: PathBuf,
    },

    /// An extraction subprocess failed
    #[error("Failed to extract '{entry}' from {bundle}: {reason}")]
    ExtractionFailed {
        /// In-bundle path that was requested
        entry: String,
        /// Bundle path
        bundle: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Symlink chain revisited a target
    #[error("Symlink loop while resolving '{entry}' in {bundle}")]
    SymlinkLoop {
        /// In-bundle path where the loop was detected
        entry: String,
        /// Bundle path
        bundle: PathBuf,
    },

    /// Symlink chain exceeded the hop budget
    #[error("Symlink chain for '{entry}' in {bundle} exceeds {limit} hops")]
    SymlinkLimitExceeded {
        /// In-bundle path being resolved
        entry: String,
        /// Bundle path
        bundle: PathBuf,
        /// Hop budget that was exhausted
        limit: usize,
    },

    /// Symlink target points outside the bundle image
    #[error("Symlink '{entry}' in {bundle} escapes the bundle")]
    SymlinkEscape {
        /// Offending in-bundle path
        entry: String,
        /// Bundle path
        bundle: PathBuf,
    },

    /// Bundle is not an ELF wrapper
    #[error("Failed to parse bundle ELF header: {reason}")]
    BadElf {
        /// Reason for the error
        reason: String,
    },
}

/// Installation engine errors
#[derive(Error, Debug)]
pub enum InstallError {
    /// Bundle digest is already registered
    #[error("Bundle with digest {digest} is already installed as '{name}'")]
    AlreadyInstalled {
        /// Registered digest
        digest: String,
        /// Registered display name
        name: String,
    },

    /// Bundle architecture does not run on this host
    #[error("Bundle architecture '{bundle_arch}' is not compatible with host '{host_arch}'")]
    ArchMismatch {
        /// Architecture parsed from the bundle
        bundle_arch: String,
        /// Host architecture
        host_arch: String,
    },

    /// Self-extraction of the bundle failed
    #[error("Bundle self-extraction failed for {bundle}: {reason}")]
    SelfExtractFailed {
        /// Bundle path
        bundle: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Uninstall could not remove all installed files
    #[error("Uninstall of '{name}' failed: {reason}")]
    UninstallFailed {
        /// Display name of the record
        name: String,
        /// Reason for the error
        reason: String,
    },

    /// Uninstall target matched no record
    #[error("No installed bundle matches '{target}'")]
    TargetNotFound {
        /// Path or digest the caller passed
        target: String,
    },

    /// A filesystem step of the install flow failed
    #[error("Install step '{step}' failed at {path}: {reason}")]
    StepFailed {
        /// Step description, present tense
        step: &'static str,
        /// Path being touched
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}

/// Registry persistence errors
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Registry document could not be parsed
    #[error("Registry file corrupted: {reason}")]
    Corrupted {
        /// Reason for the error
        reason: String,
    },

    /// Registry write failed
    #[error("Failed to save registry: {reason}")]
    SaveFailed {
        /// Reason for the error
        reason: String,
    },

    /// Update targeted an unknown record
    #[error("No record with id {id} in registry")]
    UnknownRecord {
        /// Digest that was looked up
        id: String,
    },
}

/// Update engine errors
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Update URL could not be classified
    #[error("Unsupported update source: {url}")]
    UnsupportedSource {
        /// Raw update URL
        url: String,
    },

    /// Forge API returned no usable release
    #[error("No release found for {project}")]
    NoRelease {
        /// owner/repo or project path
        project: String,
    },

    /// Download failed or was cancelled
    #[error("Download of {url} failed: {reason}")]
    DownloadFailed {
        /// Asset URL
        url: String,
        /// Reason for the error
        reason: String,
    },

    /// The operation was cancelled through its token
    #[error("Operation cancelled")]
    Cancelled,
}

/// Process lock errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Another live process holds the lock
    #[error("Bundle is locked by running process {pid}")]
    Held {
        /// PID read from the lock file
        pid: u32,
    },

    /// Lock file could not be created or read
    #[error("Failed to manage lock file {path}: {reason}")]
    Io {
        /// Lock file path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },
}
