//! Command line argument parsing.
//!
//! The surface is deliberately small: the fixed verbs, their flag
//! spellings (`install <path>` and `--install <path>` are equivalent),
//! and the daemon entry point. Everything richer belongs to the shell
//! frontends.

use clap::Parser;
use std::path::PathBuf;

/// App Manager - install, update and integrate Linux application bundles
#[derive(Parser, Debug)]
#[command(
    name = "app-manager",
    version,
    about = "Install, update and desktop-integrate self-contained Linux application bundles",
    long_about = "App Manager installs AppImage bundles into the user's applications
directory, generates freedesktop launcher entries and icons, keeps a
persistent registry of installations, and probes upstream sources
(GitHub, GitLab, direct URLs, zsync manifests) for new releases."
)]
pub struct Args {
    /// Install or upgrade the bundle at PATH
    #[arg(long, value_name = "PATH", conflicts_with_all = ["uninstall", "is_installed", "background_update"])]
    pub install: Option<PathBuf>,

    /// Uninstall by installed path, source path or digest
    #[arg(long, value_name = "TARGET", conflicts_with_all = ["is_installed", "background_update"])]
    pub uninstall: Option<String>,

    /// Print `installed` or `missing` for the bundle at PATH
    #[arg(long = "is-installed", value_name = "PATH", conflicts_with = "background_update")]
    pub is_installed: Option<PathBuf>,

    /// Run the background update daemon
    #[arg(long)]
    pub background_update: bool,

    /// Unpack the bundle instead of keeping it as a single file
    #[arg(long, conflicts_with = "portable")]
    pub extracted: bool,

    /// Keep the bundle as a single file (the default)
    #[arg(long)]
    pub portable: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// A verb (`install <path>`, `uninstall <target>`) or a bare bundle path
    #[arg(value_name = "VERB|PATH")]
    pub rest: Vec<String>,
}

/// What one invocation asks for, after folding the flag and verb forms
/// together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// No arguments: show status (the GUI activation path in frontends)
    Status,
    /// Bare bundle path: inspect it (the installer window in frontends)
    Inspect(PathBuf),
    /// Install or upgrade
    Install(PathBuf),
    /// Uninstall by path or digest
    Uninstall(String),
    /// Installation query
    IsInstalled(PathBuf),
    /// Run the daemon
    BackgroundUpdate,
    /// Arguments made no sense
    Invalid(String),
}

impl Args {
    /// Fold flags and positional verbs into one invocation.
    pub fn invocation(&self) -> Invocation {
        if let Some(path) = &self.install {
            return Invocation::Install(path.clone());
        }
        if let Some(target) = &self.uninstall {
            return Invocation::Uninstall(target.clone());
        }
        if let Some(path) = &self.is_installed {
            return Invocation::IsInstalled(path.clone());
        }
        if self.background_update {
            return Invocation::BackgroundUpdate;
        }

        match self.rest.as_slice() {
            [] => Invocation::Status,
            [verb, arg] if verb == "install" => Invocation::Install(PathBuf::from(arg)),
            [verb, arg] if verb == "uninstall" => Invocation::Uninstall(arg.clone()),
            [path] if path != "install" && path != "uninstall" => {
                Invocation::Inspect(PathBuf::from(path))
            }
            other => Invocation::Invalid(other.join(" ")),
        }
    }
}
