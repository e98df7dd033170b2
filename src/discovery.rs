//! Chart task discovery over the fixed `L*/*/chart.py` layout.

use std::path::Path;

use walkdir::WalkDir;

use crate::types::TaskRecord;

/// Files every chart script must write next to itself.
pub const ARTIFACTS: [&str; 2] = ["chart.pdf", "chart.png"];

/// The only script name that is discovered.
pub const SCRIPT_NAME: &str = "chart.py";

/// Find every `L*/<dir>/chart.py` under `root`, sorted by path.
///
/// Exactly two directory levels are allowed between `root` and the script,
/// and the first must start with `L`. Anything shallower, deeper, or
/// differently named is ignored. Symlinked directories are followed.
pub fn discover(root: &Path) -> Vec<TaskRecord> {
    let mut tasks: Vec<TaskRecord> = WalkDir::new(root)
        .follow_links(true)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|entry| {
            return match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    None
                },
            };
        })
        .filter(|entry| return entry.file_type().is_file() && entry.file_name() == SCRIPT_NAME)
        .filter(|entry| return in_lesson_dir(root, entry.path()))
        .filter_map(|entry| return task_for(entry.path()))
        .collect();

    tasks.sort();
    tracing::info!(tasks = tasks.len(), root = %root.display(), "discovered chart scripts");
    return tasks;
}

/// Whether the first component below `root` is a lesson directory (`L*`).
fn in_lesson_dir(root: &Path, script: &Path) -> bool {
    return script
        .strip_prefix(root)
        .ok()
        .and_then(|relative| return relative.components().next())
        .is_some_and(|lesson| return lesson.as_os_str().to_string_lossy().starts_with('L'));
}

/// Build the task for a script path: its directory and expected artifacts.
fn task_for(script: &Path) -> Option<TaskRecord> {
    let working_dir = script.parent()?.to_path_buf();
    let artifacts = ARTIFACTS.iter().map(|name| return working_dir.join(name)).collect();
    return Some(TaskRecord { artifacts, script_path: script.to_path_buf(), working_dir });
}
