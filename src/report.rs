//! Link check report: per-file trace, summary block, JSON form, exit code.

use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use serde::Serialize;

use crate::crawler::FileReport;
use crate::diagnostics::Palette;
use crate::error::Error;
use crate::types::{LinkRecord, LinkStatus};

const RULE: &str = "============================================================";

/// One file inside the JSON report.
#[derive(Serialize)]
struct JsonFile<'a> {
    /// Read failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    /// Path relative to the base path.
    file: String,
    /// Every link with its verdict.
    links: &'a [LinkRecord],
}

/// Machine-readable report.
#[derive(Serialize)]
struct JsonReport<'a> {
    /// Per-file results in crawl order.
    files: Vec<JsonFile<'a>>,
    /// Global counts.
    summary: LinkSummary,
}

/// Global counts for one crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    /// Broken links, plus one per unreadable file.
    pub broken: usize,
    /// HTML files crawled.
    pub files_checked: usize,
    /// Links deliberately not checked.
    pub skipped: usize,
    /// Every link, plus one per unreadable file.
    pub total_links: usize,
    /// Links whose target was found.
    pub valid: usize,
}

impl LinkSummary {
    /// `0` with no broken links, `1` otherwise.
    pub fn exit_code(&self) -> ExitCode {
        if self.broken > 0 {
            return ExitCode::from(1);
        }
        return ExitCode::SUCCESS;
    }
}

/// Display a path relative to the crawl root when it lies beneath it.
fn relative(root: &Path, path: &Path) -> String {
    let shown = path.strip_prefix(root).unwrap_or(path);
    return shown.display().to_string();
}

/// Render the JSON report.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn render_json(reports: &[FileReport], summary: LinkSummary, root: &Path) -> Result<String, Error> {
    let files = reports
        .iter()
        .map(|report| {
            return JsonFile {
                error: report.error.as_deref(),
                file: relative(root, &report.path),
                links: &report.links,
            };
        })
        .collect();
    return Ok(serde_json::to_string_pretty(&JsonReport { files, summary })?);
}

/// Render the per-file trace followed by the summary block.
///
/// Without `verbose`, only files with something broken are listed and only
/// their broken links are shown.
pub fn render_text(
    reports: &[FileReport],
    summary: LinkSummary,
    root: &Path,
    verbose: bool,
    palette: Palette,
) -> String {
    let mut out = format!("Checking {} HTML files in {}\n", summary.files_checked, root.display());

    for report in reports {
        if !verbose && report.broken_count() == 0 {
            continue;
        }
        let _ = write!(out, "\n{}\n", palette.bold(&relative(root, &report.path)));
        if let Some(error) = &report.error {
            let _ = writeln!(out, "  {} {error}", palette.red("[ERROR]"));
        }
        for link in &report.links {
            write_link(&mut out, link, root, verbose, palette);
        }
    }

    write_summary(&mut out, summary, palette);
    return out;
}

/// Count links by status across every file.
pub fn summarize(reports: &[FileReport]) -> LinkSummary {
    let mut summary = LinkSummary { files_checked: reports.len(), ..LinkSummary::default() };
    for report in reports {
        if report.error.is_some() {
            summary.broken = summary.broken.saturating_add(1);
            summary.total_links = summary.total_links.saturating_add(1);
        }
        for link in &report.links {
            summary.total_links = summary.total_links.saturating_add(1);
            match link.status {
                LinkStatus::Broken => summary.broken = summary.broken.saturating_add(1),
                LinkStatus::Skipped => summary.skipped = summary.skipped.saturating_add(1),
                LinkStatus::Valid => summary.valid = summary.valid.saturating_add(1),
                LinkStatus::Pending => {
                    tracing::warn!(target = %link.raw_target, "link left unchecked");
                    summary.broken = summary.broken.saturating_add(1);
                },
            }
        }
    }
    return summary;
}

/// One trace line, plus provenance and reason for broken links.
fn write_link(out: &mut String, link: &LinkRecord, root: &Path, verbose: bool, palette: Palette) {
    match link.status {
        LinkStatus::Broken | LinkStatus::Pending => {
            let _ = writeln!(out, "  {} {}", palette.red("[BROKEN]"), link.raw_target);
            let source = relative(root, &link.source_file);
            let _ = writeln!(out, "    Source: {source}:{}", link.source_line);
            let reason = link.reason.as_deref().unwrap_or("unchecked");
            let _ = writeln!(out, "    Error: {reason}");
        },
        LinkStatus::Skipped if verbose => {
            let reason = link.reason.as_deref().unwrap_or("skipped");
            let reason = palette.dim(&format!("({reason})"));
            let _ = writeln!(out, "  {} {} {reason}", palette.yellow("[SKIP]"), link.raw_target);
        },
        LinkStatus::Valid if verbose => {
            let _ = writeln!(out, "  {} {}", palette.green("[OK]"), link.raw_target);
        },
        LinkStatus::Skipped | LinkStatus::Valid => {},
    }
}

/// The trailing counts block and verdict line.
fn write_summary(out: &mut String, summary: LinkSummary, palette: Palette) {
    let _ = write!(
        out,
        "\n{RULE}\n{}\n  Files checked: {}\n  Total links:   {}\n  Valid:         {}\n  Broken:        {}\n  Skipped:       {}\n{RULE}\n",
        palette.bold("Link check summary"),
        summary.files_checked,
        summary.total_links,
        summary.valid,
        summary.broken,
        summary.skipped,
    );
    if summary.broken == 0 {
        let _ = writeln!(out, "{}", palette.green("All links valid."));
    } else {
        let noun = if summary.broken == 1 { "link" } else { "links" };
        let _ = writeln!(out, "{}", palette.red(&format!("Found {} broken {noun}.", summary.broken)));
    }
}
