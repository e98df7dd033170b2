//! Post-run artifact check for chart tasks.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::types::TaskRecord;

/// Filesystems with coarse timestamps can record a write slightly before the
/// instant we sampled as the task start.
const MTIME_SLACK: Duration = Duration::from_secs(1);

/// What is wrong with one expected artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactProblem {
    /// The file does not exist.
    Missing(String),
    /// The file exists but predates the run.
    Stale(String),
}

impl std::fmt::Display for ArtifactProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return match self {
            Self::Missing(name) => write!(f, "missing {name}"),
            Self::Stale(name) => write!(f, "stale {name} (not rewritten by this run)"),
        };
    }
}

/// Check that every artifact of `task` exists and was modified at or after
/// `started`. Returns the problems found, empty when the task is clean.
pub fn verify(task: &TaskRecord, started: SystemTime) -> Vec<ArtifactProblem> {
    let threshold = started.checked_sub(MTIME_SLACK).unwrap_or(started);
    return task
        .artifacts
        .iter()
        .filter_map(|artifact| return check_artifact(artifact, threshold))
        .collect();
}

/// One artifact against the freshness threshold.
fn check_artifact(artifact: &Path, threshold: SystemTime) -> Option<ArtifactProblem> {
    let name = artifact
        .file_name()
        .map_or_else(|| return artifact.display().to_string(), |n| return n.to_string_lossy().into_owned());

    let Ok(metadata) = std::fs::metadata(artifact) else {
        return Some(ArtifactProblem::Missing(name));
    };
    if !metadata.is_file() {
        return Some(ArtifactProblem::Missing(name));
    }
    // An unreadable mtime is treated as fresh: existence is all we can check.
    let Ok(modified) = metadata.modified() else {
        return None;
    };
    if modified < threshold {
        tracing::debug!(artifact = %artifact.display(), "artifact older than task start");
        return Some(ArtifactProblem::Stale(name));
    }
    return None;
}
