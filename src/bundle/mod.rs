//! Bundle identity and metadata.
//!
//! A bundle's identity is the SHA-256 digest of its full contents; the
//! rest of the metadata (display name, architecture, embedded update
//! hint) is derived from the filename and the ELF wrapper.

pub mod elf;
pub mod extract;

use crate::error::{ExtractError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Identity and parsed metadata of a bundle file.
#[derive(Debug, Clone)]
pub struct BundleMetadata {
    /// Bundle path as given
    pub path: PathBuf,
    /// SHA-256 hex digest of the full file
    pub digest: String,
    /// Human-readable name derived from the filename
    pub display_name: String,
    /// Filename stem safe for path construction
    pub sanitized_stem: String,
    /// Whether the POSIX executable bit is set
    pub executable: bool,
    /// Short architecture name from the ELF header
    pub arch: Option<String>,
    /// Embedded update hint from the `.upd_info` section
    pub update_hint: Option<String>,
}

impl BundleMetadata {
    /// Read the metadata of the bundle at `path`.
    ///
    /// The digest is streamed over the whole file and can take seconds
    /// for large bundles; the work runs on a blocking worker thread.
    pub async fn read(path: &Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path).await.map_err(|_| {
            ExtractError::NotFound {
                path: path.to_path_buf(),
            }
        })?;
        let executable = meta.permissions().mode() & 0o111 != 0;

        let owned = path.to_path_buf();
        let (digest, elf) = tokio::task::spawn_blocking(move || {
            let digest = file_digest(&owned)?;
            let elf = elf::inspect(&owned)?;
            Ok::<_, ExtractError>((digest, elf))
        })
        .await
        .map_err(|e| anyhow::anyhow!("metadata task failed: {e}"))??;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            digest,
            display_name: display_name_from_filename(file_name),
            sanitized_stem: sanitize_stem(strip_bundle_suffix(file_name)),
            executable,
            arch: elf.arch.map(str::to_string),
            update_hint: elf.update_hint,
        })
    }

    /// True when the bundle's architecture can run on this host.
    ///
    /// A bundle with no recognizable architecture is given the benefit of
    /// the doubt.
    pub fn arch_compatible(&self) -> bool {
        match &self.arch {
            Some(arch) => {
                let host = host_arch();
                arch == host || arch_aliases(host).contains(&arch.as_str())
            }
            None => true,
        }
    }
}

/// Streamed SHA-256 of a file, hex-encoded.
pub fn file_digest(path: &Path) -> std::result::Result<String, ExtractError> {
    let mut file = std::fs::File::open(path).map_err(|_| ExtractError::NotFound {
        path: path.to_path_buf(),
    })?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf).map_err(|e| ExtractError::ExtractionFailed {
            entry: String::new(),
            bundle: path.to_path_buf(),
            reason: format!("digest read failed: {e}"),
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Short architecture name of the host, in the same vocabulary as the
/// bundle parser.
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "aarch64" => "aarch64",
        "arm" => "armv7l",
        "x86" => "i686",
        other => other_arch(other),
    }
}

fn other_arch(other: &str) -> &'static str {
    log::warn!("unrecognized host architecture '{other}', assuming x86_64");
    "x86_64"
}

/// Aliases under which `arch` appears in release asset names.
pub fn arch_aliases(arch: &str) -> &'static [&'static str] {
    match arch {
        "x86_64" => &["x86_64", "x86-64", "amd64", "x64"],
        "aarch64" => &["aarch64", "arm64"],
        "armv7l" => &["armv7l", "armhf", "arm32"],
        "i686" => &["i686", "i386", "x86", "ia32"],
        _ => &[],
    }
}

/// Every alias of every known architecture, for "contains no arch token"
/// checks during asset selection.
pub fn all_arch_aliases() -> impl Iterator<Item = &'static str> {
    ["x86_64", "aarch64", "armv7l", "i686"]
        .into_iter()
        .flat_map(arch_aliases)
        .copied()
}

fn strip_bundle_suffix(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".appimage") {
        &file_name[..file_name.len() - ".appimage".len()]
    } else {
        file_name
    }
}

/// Display name from a bundle filename: drop the suffix, turn separators
/// into spaces, capitalize the first character.
pub fn display_name_from_filename(file_name: &str) -> String {
    let stem = strip_bundle_suffix(file_name);
    let spaced: String = stem
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    let spaced = spaced.trim().to_string();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

/// Filename stem with anything outside `[A-Za-z0-9_-]` mapped to a dash.
pub fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
