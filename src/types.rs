/// Core domain types for link validation and chart builds.
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Which checker owns a link. Assigned once during classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Network URL, probed only with `--check-external`.
    External,
    /// Same-file anchor such as `#results`.
    Fragment,
    /// Filesystem path, optionally carrying a `#fragment` suffix.
    LocalFile,
    /// Scheme that is never checked (`mailto:`, `tel:`, `javascript:` …).
    Skip,
}

/// One discovered reference and, once checked, its verdict.
#[derive(Debug, Clone, Serialize)]
pub struct LinkRecord {
    /// Checker bucket for this link.
    pub kind: LinkKind,
    /// The literal `href`/`src` attribute value.
    pub raw_target: String,
    /// Human-readable explanation for broken or skipped links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Absolute path the reference maps to (local files only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<PathBuf>,
    /// HTML file containing the reference.
    pub source_file: PathBuf,
    /// One-based line of the tag that carried the reference.
    pub source_line: u32,
    /// Current verdict. `Pending` only between extraction and checking.
    pub status: LinkStatus,
}

impl LinkRecord {
    /// A freshly classified link awaiting its checker.
    pub fn pending(source_file: PathBuf, source_line: u32, raw_target: String, kind: LinkKind) -> Self {
        return Self {
            kind,
            raw_target,
            reason: None,
            resolved_path: None,
            source_file,
            source_line,
            status: LinkStatus::Pending,
        };
    }

    /// Record the checker's verdict. A record is settled exactly once.
    pub fn settle(&mut self, verdict: Verdict) {
        debug_assert!(
            self.status == LinkStatus::Pending,
            "link {} settled twice",
            self.raw_target
        );
        self.status = verdict.status;
        self.reason = verdict.reason;
    }
}

/// Outcome of checking a single link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Target missing, fragment missing, or probe failed.
    Broken,
    /// Not yet checked.
    Pending,
    /// Deliberately not checked; never escalated to broken.
    Skipped,
    /// Target exists.
    Valid,
}

/// A checker's answer for one link: status plus optional reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Why the link is broken or skipped.
    pub reason: Option<String>,
    /// The resulting status.
    pub status: LinkStatus,
}

impl Verdict {
    /// Broken with an explanation.
    pub fn broken(reason: impl Into<String>) -> Self {
        return Self { reason: Some(reason.into()), status: LinkStatus::Broken };
    }

    /// Skipped with an explanation.
    pub fn skipped(reason: impl Into<String>) -> Self {
        return Self { reason: Some(reason.into()), status: LinkStatus::Skipped };
    }

    /// Valid, no explanation needed.
    pub const fn valid() -> Self {
        return Self { reason: None, status: LinkStatus::Valid };
    }
}

/// Why a chart task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The interpreter could not be started or the worker crashed.
    LaunchError,
    /// Exited zero but `chart.pdf`/`chart.png` was absent or stale.
    MissingArtifact,
    /// The task succeeded.
    None,
    /// Exited with a nonzero status or was killed by a signal.
    NonzeroExit,
    /// Exceeded the wall-clock limit and was killed.
    Timeout,
}

impl FailureReason {
    /// Label used in the summary and failure list.
    pub const fn label(self) -> &'static str {
        return match self {
            Self::LaunchError => "launch_error",
            Self::MissingArtifact => "missing_artifact",
            Self::None => "none",
            Self::NonzeroExit => "nonzero_exit",
            Self::Timeout => "timeout",
        };
    }
}

/// One discovered `chart.py` and the artifacts it must write.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskRecord {
    /// Files that must exist (and be fresh) after a zero exit.
    pub artifacts: Vec<PathBuf>,
    /// Path to the script.
    pub script_path: PathBuf,
    /// Directory the script runs in: its parent.
    pub working_dir: PathBuf,
}

/// Terminal outcome of one task. Produced once by the executor.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Short failure detail (exit status, missing file names, limit hit).
    pub detail: Option<String>,
    /// Wall-clock time from spawn to verdict.
    pub duration: Duration,
    /// Failure classification, `None` on success.
    pub reason: FailureReason,
    /// Script this result belongs to.
    pub script_path: PathBuf,
    /// Trailing stderr lines for diagnostics.
    pub stderr_excerpt: String,
    /// Success or failure.
    pub status: TaskStatus,
}

impl TaskResult {
    /// A failed result with the given reason and detail.
    pub fn failure(
        task: &TaskRecord,
        reason: FailureReason,
        detail: String,
        stderr_excerpt: String,
        duration: Duration,
    ) -> Self {
        return Self {
            detail: Some(detail),
            duration,
            reason,
            script_path: task.script_path.clone(),
            stderr_excerpt,
            status: TaskStatus::Failure,
        };
    }

    /// Whether the task failed.
    pub fn is_failure(&self) -> bool {
        return self.status == TaskStatus::Failure;
    }

    /// A successful result.
    pub fn success(task: &TaskRecord, stderr_excerpt: String, duration: Duration) -> Self {
        return Self {
            detail: None,
            duration,
            reason: FailureReason::None,
            script_path: task.script_path.clone(),
            stderr_excerpt,
            status: TaskStatus::Success,
        };
    }
}

/// Whether a task produced its charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Timed out, exited nonzero, failed to launch, or left artifacts missing.
    Failure,
    /// Exited zero and wrote fresh artifacts.
    Success,
}
