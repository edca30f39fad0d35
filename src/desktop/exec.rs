//! Pure helpers over `Exec=` lines and AppRun entry-point scripts.
//!
//! Nothing in this module touches the filesystem except
//! [`resolve_exec`], which only inspects path metadata handed to it.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// First token of an `Exec=` line, honoring double-quoted spans.
pub fn first_exec_token(exec: &str) -> Option<String> {
    let exec = exec.trim_start();
    if exec.is_empty() {
        return None;
    }
    if let Some(rest) = exec.strip_prefix('"') {
        let end = rest.find('"')?;
        return Some(rest[..end].to_string());
    }
    Some(
        exec.split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
    )
}

/// Arguments of an `Exec=` line after its first token, trimmed.
pub fn exec_remainder(exec: &str) -> String {
    let exec = exec.trim_start();
    if let Some(rest) = exec.strip_prefix('"') {
        match rest.find('"') {
            Some(end) => rest[end + 1..].trim().to_string(),
            None => String::new(),
        }
    } else {
        match exec.split_once(char::is_whitespace) {
            Some((_, rest)) => rest.trim().to_string(),
            None => String::new(),
        }
    }
}

/// Strip a `$APPDIR` / `${APPDIR}` prefix, with or without a trailing
/// separator, from a token.
pub fn strip_appdir_prefix(token: &str) -> &str {
    for prefix in ["${APPDIR}", "$APPDIR"] {
        if let Some(rest) = token.strip_prefix(prefix) {
            return rest.trim_start_matches('/');
        }
    }
    token
}

/// True when the token names the generic entry-point script.
pub fn is_entry_point_token(token: &str) -> bool {
    let basename = token.rsplit('/').next().unwrap_or(token);
    basename.eq_ignore_ascii_case("AppRun") || basename.eq_ignore_ascii_case("AppRun.sh")
}

fn bin_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*(?:export\s+)?BIN=["']?([^"'\n]+?)["']?\s*$"#)
            .expect("static regex")
    })
}

/// Parse a shell-like `BIN=...` assignment out of an AppRun script and
/// return the executable basename it points at.
pub fn parse_bin_assignment(script: &str) -> Option<String> {
    let captures = bin_assignment_re().captures(script)?;
    let value = captures.get(1)?.as_str().trim();
    let stripped = strip_appdir_prefix(value);
    let basename = stripped.rsplit('/').next().unwrap_or(stripped);
    if basename.is_empty() {
        None
    } else {
        Some(basename.to_string())
    }
}

/// Resolve an `Exec=` line to an absolute executable path.
///
/// An absolute first token wins; otherwise the token is joined onto the
/// installed directory when the installation is a tree, and the installed
/// path itself is the answer for single-file installs.
pub fn resolve_exec(exec: &str, installed_path: &Path) -> PathBuf {
    match first_exec_token(exec) {
        Some(token) if token.starts_with('/') => PathBuf::from(token),
        Some(token) if installed_path.is_dir() => {
            installed_path.join(strip_appdir_prefix(&token))
        }
        _ => installed_path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_handles_quotes_and_args() {
        assert_eq!(first_exec_token("hello %U").as_deref(), Some("hello"));
        assert_eq!(
            first_exec_token("\"/opt/My App/bin\" --flag").as_deref(),
            Some("/opt/My App/bin")
        );
        assert_eq!(first_exec_token("").as_deref(), None);
    }

    #[test]
    fn remainder_preserves_trailing_arguments() {
        assert_eq!(exec_remainder("hello %U"), "%U");
        assert_eq!(exec_remainder("\"/opt/My App/bin\" --flag %F"), "--flag %F");
        assert_eq!(exec_remainder("solo"), "");
    }

    #[test]
    fn appdir_prefix_variants() {
        assert_eq!(strip_appdir_prefix("$APPDIR/usr/bin/app"), "usr/bin/app");
        assert_eq!(strip_appdir_prefix("${APPDIR}/usr/bin/app"), "usr/bin/app");
        assert_eq!(strip_appdir_prefix("$APPDIR"), "");
        assert_eq!(strip_appdir_prefix("usr/bin/app"), "usr/bin/app");
    }

    #[test]
    fn entry_point_detection_is_case_insensitive() {
        assert!(is_entry_point_token("AppRun"));
        assert!(is_entry_point_token("apprun.sh"));
        assert!(is_entry_point_token("$APPDIR/AppRun"));
        assert!(!is_entry_point_token("approximate"));
    }

    #[test]
    fn bin_assignment_expansions() {
        assert_eq!(
            parse_bin_assignment("#!/bin/sh\nBIN=\"$APPDIR/usr/bin/hello\"\nexec $BIN"),
            Some("hello".to_string())
        );
        assert_eq!(
            parse_bin_assignment("BIN=${APPDIR}/opt/tool\n"),
            Some("tool".to_string())
        );
        assert_eq!(parse_bin_assignment("export BIN=plain"), Some("plain".to_string()));
        assert_eq!(parse_bin_assignment("NOT_BIN=x"), None);
    }

    #[test]
    fn resolve_prefers_absolute_token() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_exec("/usr/bin/hello %U", tmp.path()),
            PathBuf::from("/usr/bin/hello")
        );
        // Relative token joined onto an installed directory.
        assert_eq!(
            resolve_exec("usr/bin/hello", tmp.path()),
            tmp.path().join("usr/bin/hello")
        );
        // Single-file install resolves to the file itself.
        let file = tmp.path().join("Hello.AppImage");
        std::fs::write(&file, b"").unwrap();
        assert_eq!(resolve_exec("hello %U", &file), file);
    }
}
