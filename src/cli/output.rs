//! Terminal output for the CLI verbs.
//!
//! Renders engine results with the same status vocabulary the update
//! log uses (`ok`, `warning:`, `error:`), plus a one-line renderer for
//! registry records. Errors always reach stderr; everything else
//! respects the quiet and verbose flags.

use crate::registry::{InstallMode, InstallationRecord};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Writes CLI output with consistent status tags.
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    /// Output gated by the global `--verbose` / `--quiet` flags.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    fn stdout() -> StandardStream {
        StandardStream::stdout(ColorChoice::Auto)
    }

    fn tagged(stream: &mut StandardStream, tag: &str, color: Color, message: &str) {
        let _ = stream.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
        let _ = write!(stream, "{tag}");
        let _ = stream.reset();
        let _ = writeln!(stream, " {message}");
    }

    /// Headline line, e.g. the status summary.
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        Self::tagged(&mut Self::stdout(), "::", Color::Cyan, message);
    }

    /// A completed operation.
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        Self::tagged(&mut Self::stdout(), "ok", Color::Green, message);
    }

    /// Something worth attention that is not a failure.
    pub fn warn(&self, message: &str) {
        if self.quiet {
            return;
        }
        Self::tagged(&mut Self::stdout(), "warning:", Color::Yellow, message);
    }

    /// Failures go to stderr regardless of the quiet flag.
    pub fn error(&self, message: &str) {
        let mut stream = StandardStream::stderr(ColorChoice::Auto);
        Self::tagged(&mut stream, "error:", Color::Red, message);
    }

    /// One registry record, as listed by the status verb: effective
    /// name, version, install mode, installed path.
    pub fn record_line(&self, record: &InstallationRecord) {
        if self.quiet {
            return;
        }
        let mut stream = Self::stdout();
        let _ = write!(stream, "  {}", record.effective_name());
        if let Some(version) = &record.version {
            let _ = write!(stream, " {version}");
        }
        let mode = match record.mode {
            InstallMode::Portable => "portable",
            InstallMode::Extracted => "extracted",
        };
        let _ = stream.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)));
        let _ = write!(stream, " [{mode}]");
        let _ = stream.reset();
        let _ = stream.set_color(ColorSpec::new().set_dimmed(true));
        let _ = writeln!(stream, " {}", record.installed_path.display());
        let _ = stream.reset();
    }

    /// Plain line, e.g. the `installed`/`missing` query answers.
    pub fn println(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    /// Line shown only under `--verbose`.
    pub fn verbose_println(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{}", message);
        }
    }

    /// Indented detail under a preceding headline.
    pub fn indent(&self, message: &str) {
        if !self.quiet {
            println!("  {}", message);
        }
    }
}
