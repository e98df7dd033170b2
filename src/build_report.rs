//! Chart build output: progress lines, summary, failure list, JSON, exit code.

use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use serde::Serialize;

use crate::diagnostics::Palette;
use crate::error::Error;
use crate::scheduler::Progress;
use crate::types::{FailureReason, TaskRecord, TaskResult, TaskStatus};

const RULE: &str = "============================================================";

/// Pass/fail counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    /// Tasks that failed for any reason.
    pub failed: usize,
    /// Tasks that exited zero with fresh artifacts.
    pub successful: usize,
    /// Tasks discovered.
    pub total: usize,
}

impl BuildSummary {
    /// `0` when every task succeeded, `1` otherwise.
    pub fn exit_code(&self) -> ExitCode {
        if self.failed > 0 {
            return ExitCode::from(1);
        }
        return ExitCode::SUCCESS;
    }
}

/// Machine-readable batch report.
#[derive(Serialize)]
struct JsonBuild<'a> {
    /// Wall-clock time for the whole batch.
    elapsed_secs: f64,
    /// Counts.
    summary: BuildSummary,
    /// One entry per task in discovery order.
    tasks: Vec<JsonTask<'a>>,
}

/// One task in the JSON report.
#[derive(Serialize)]
struct JsonTask<'a> {
    /// Failure detail, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<&'a str>,
    /// Time from spawn to verdict.
    duration_secs: f64,
    /// Failure classification.
    reason: FailureReason,
    /// Script path relative to the root.
    script: String,
    /// Trailing stderr lines.
    stderr_excerpt: &'a str,
    /// Success or failure.
    status: TaskStatus,
}

/// Prints one line per task as the scheduler reports progress.
///
/// Sequential runs print `Running: <path>... ` before the task and the
/// verdict after it. Parallel runs print the whole line on completion.
pub struct ProgressPrinter<W: Write> {
    /// Destination, normally stdout.
    out: W,
    /// Styling for OK/FAIL.
    palette: Palette,
    /// Whether the line prefix was already written by `started`.
    prefix_written: bool,
    /// Root that script paths are shown relative to.
    root: PathBuf,
}

impl<W: Write> ProgressPrinter<W> {
    /// The writer, for inspection after the run.
    #[cfg(test)]
    fn into_inner(self) -> W {
        return self.out;
    }

    /// A printer writing to `out`.
    pub const fn new(out: W, root: PathBuf, palette: Palette) -> Self {
        return Self { out, palette, prefix_written: false, root };
    }
}

impl<W: Write> Progress for ProgressPrinter<W> {
    fn finished(&mut self, result: &TaskResult) {
        if !self.prefix_written {
            let _ = write!(self.out, "Running: {}... ", relative(&self.root, &result.script_path));
        }
        self.prefix_written = false;
        let _ = writeln!(self.out, "{}", verdict(result, self.palette));
        let _ = self.out.flush();
    }

    fn started(&mut self, task: &TaskRecord) {
        let _ = write!(self.out, "Running: {}... ", relative(&self.root, &task.script_path));
        let _ = self.out.flush();
        self.prefix_written = true;
    }
}

/// Progress observer for `--format json`: prints nothing.
pub struct Silent;

impl Progress for Silent {
    fn finished(&mut self, _result: &TaskResult) {}

    fn started(&mut self, _task: &TaskRecord) {}
}

/// One-decimal seconds, e.g. `1.2s`.
fn format_duration(duration: Duration) -> String {
    return format!("{:.1}s", duration.as_secs_f64());
}

/// Script path relative to the root when possible.
fn relative(root: &Path, path: &Path) -> String {
    let shown = path.strip_prefix(root).unwrap_or(path);
    return shown.display().to_string();
}

/// Render every result plus the summary as JSON.
///
/// # Errors
///
/// Returns `Error::Json` if serialization fails.
pub fn render_json(results: &[TaskResult], root: &Path, elapsed: Duration) -> Result<String, Error> {
    let tasks = results
        .iter()
        .map(|result| {
            return JsonTask {
                detail: result.detail.as_deref(),
                duration_secs: result.duration.as_secs_f64(),
                reason: result.reason,
                script: relative(root, &result.script_path),
                stderr_excerpt: &result.stderr_excerpt,
                status: result.status,
            };
        })
        .collect();
    let report = JsonBuild { elapsed_secs: elapsed.as_secs_f64(), summary: summarize(results), tasks };
    return Ok(serde_json::to_string_pretty(&report)?);
}

/// Summary block followed by the failure list.
///
/// Each failure names the script, its reason label, the detail, and the
/// stderr excerpt, so a CI log is enough to act on.
pub fn render_summary(results: &[TaskResult], root: &Path, elapsed: Duration, palette: Palette) -> String {
    let summary = summarize(results);
    let mut out = format!(
        "\n{RULE}\n{}\nTotal: {}, Successful: {}, Failed: {}\nElapsed: {}\n{RULE}\n",
        palette.bold("Chart build summary"),
        summary.total,
        summary.successful,
        summary.failed,
        format_duration(elapsed),
    );

    let failures: Vec<&TaskResult> = results.iter().filter(|r| return r.is_failure()).collect();
    if failures.is_empty() {
        let _ = writeln!(out, "{}", palette.green("All charts built."));
        return out;
    }

    let _ = write!(out, "\n{}\n", palette.red("Failed charts:"));
    for failure in failures {
        let _ = write!(out, "  {}: {}", relative(root, &failure.script_path), failure.reason.label());
        match &failure.detail {
            Some(detail) => {
                let _ = writeln!(out, " ({detail})");
            },
            None => out.push('\n'),
        }
        for line in failure.stderr_excerpt.lines() {
            let _ = writeln!(out, "      {}", palette.dim(line));
        }
    }
    return out;
}

/// Count outcomes.
pub fn summarize(results: &[TaskResult]) -> BuildSummary {
    let failed = results.iter().filter(|r| return r.is_failure()).count();
    return BuildSummary {
        failed,
        successful: results.len().saturating_sub(failed),
        total: results.len(),
    };
}

/// `OK (1.2s)` or `FAIL (0.3s): timeout - timed out after 60s`.
fn verdict(result: &TaskResult, palette: Palette) -> String {
    let took = format_duration(result.duration);
    if !result.is_failure() {
        return format!("{} ({took})", palette.green("OK"));
    }
    let mut line = format!("{} ({took}): {}", palette.red("FAIL"), result.reason.label());
    if let Some(detail) = &result.detail {
        let _ = write!(line, " - {detail}");
    }
    return line;
}
