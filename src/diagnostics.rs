use std::io::IsTerminal as _;

use crate::config::CONFIG_FILE;
use crate::error::Error;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const YELLOW: &str = "\x1b[33m";

/// ANSI styling for report output. Disabled means every method returns the
/// text unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    /// Whether escape codes are emitted.
    enabled: bool,
}

impl Palette {
    /// Bold, for headings.
    pub fn bold(self, text: &str) -> String {
        return self.paint(BOLD, text);
    }

    /// Color unless `--no-color` was given, `NO_COLOR` is set, or stdout is
    /// not a terminal.
    pub fn detect(no_color: bool) -> Self {
        let enabled = !no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal();
        return Self { enabled };
    }

    /// Dim, for secondary lines.
    pub fn dim(self, text: &str) -> String {
        return self.paint(DIM, text);
    }

    /// Green, for valid results.
    pub fn green(self, text: &str) -> String {
        return self.paint(GREEN, text);
    }

    /// A palette that never emits escape codes.
    pub const fn plain() -> Self {
        return Self { enabled: false };
    }

    /// Red, for broken links and failures.
    pub fn red(self, text: &str) -> String {
        return self.paint(RED, text);
    }

    /// Yellow, for skipped links.
    pub fn yellow(self, text: &str) -> String {
        return self.paint(YELLOW, text);
    }

    /// Wrap `text` in `code` when enabled.
    fn paint(self, code: &str, text: &str) -> String {
        if self.enabled {
            return format!("{code}{text}{RESET}");
        }
        return text.to_string();
    }
}

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    let bold_headings = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    for line in md.lines() {
        if bold_headings && line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where the user can
/// act on it, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::ConfigInvalid { path, source } => render_config_invalid(path, source),
        Error::DirectoryNotFound { flag, path } => format!(
            "\
# Error: Directory Not Found

`{}` does not exist.

## Fix

Pass the site or course root:

    {}
",
            path.display(),
            rerun_with(flag)
        ),
        Error::ExternalUnavailable => "\
# Error: External Checking Unavailable

This build of lessonctl has no HTTP support.

## Fix

Rebuild with the default features, or drop `--check-external`:

    cargo build --features external
"
        .to_string(),
        Error::InvalidWorkers { count } => format!(
            "\
# Error: Invalid Worker Count

`{count}` workers requested; at least 1 is required.

## Fix

    lessonctl charts --parallel --workers 4
"
        ),
        Error::NotADirectory { flag, path } => format!(
            "\
# Error: Not A Directory

`{}` is a file. lessonctl walks a directory tree.

## Fix

Pass the directory that contains it:

    {}
",
            path.display(),
            rerun_with(flag)
        ),
        _ => render_generic(e),
    };
}

/// Invalid config, with the recognized keys as a reminder.
fn render_config_invalid(path: &std::path::Path, source: &toml::de::Error) -> String {
    return format!(
        "\
# Error: Invalid Config

`{}` could not be read:

{source}

## Fix

Recognized keys in `{CONFIG_FILE}`:

    [links]
    directory_index = [\"index.html\"]
    exclude = [\"drafts/\"]
    external_workers = 8
    skip_hosts = [\"cdn.jsdelivr.net\"]
    timeout_secs = 10

    [charts]
    interpreter = \"python3\"
    timeout_secs = 60
    workers = 4
",
        path.display()
    );
}

/// The command line that takes `flag`, with a placeholder directory.
fn rerun_with(flag: &str) -> String {
    let command = if flag == "--root" { "charts" } else { "links" };
    return format!("lessonctl {command} {flag} <DIR>");
}

/// Errors with no specific fix: heading plus the underlying message.
fn render_generic(e: &Error) -> String {
    return match e {
        Error::HttpClient { reason } => format!(
            "\
# Error: HTTP Client

{reason}
"
        ),
        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Json(e) => format!(
            "\
# Error: JSON Output

{e}
"
        ),
        Error::ParseFailed { file, reason } => format!(
            "\
# Error: Parse Failed

Could not parse `{}`: {reason}
",
            file.display()
        ),
        // Already handled in render_error, but need exhaustive match.
        _ => format!(
            "\
# Error

{e}
"
        ),
    };
}
