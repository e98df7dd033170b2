//! Run one chart script under a hard wall-clock limit.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::Receiver;

use crate::types::{FailureReason, TaskRecord, TaskResult};
use crate::verifier;

#[cfg(unix)]
const ESRCH: i32 = 3;

/// Trailing stderr lines kept for the failure list.
const EXCERPT_LINES: usize = 10;

/// How long to wait for pipe readers once the process is gone.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Delay between exit polls.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[cfg(unix)]
const SIGKILL: i32 = 9;

#[cfg(unix)]
unsafe extern "C" {
    fn kill(pid: i32, sig: i32) -> i32;
}

/// How the wait on a child ended.
enum Exit {
    /// The process exited on its own.
    Finished(ExitStatus),
    /// The deadline passed; the process group was killed.
    TimedOut,
    /// Polling the child failed; it was killed to avoid an orphan.
    WaitFailed(std::io::Error),
}

/// Runs tasks as `<interpreter> chart.py` inside the script's directory.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    /// Program that runs the script.
    interpreter: String,
    /// Per-task wall-clock limit.
    timeout: Duration,
}

impl TaskExecutor {
    /// An executor running `interpreter` with the given limit.
    pub const fn new(interpreter: String, timeout: Duration) -> Self {
        return Self { interpreter, timeout };
    }

    /// Run one task to a terminal result. Never panics on child failure:
    /// launch errors, timeouts, nonzero exits, and missing artifacts all
    /// come back as failure results.
    pub fn run(&self, task: &TaskRecord) -> TaskResult {
        let started_at = SystemTime::now();
        let clock = Instant::now();

        let mut child = match self.spawn(task) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(script = %task.script_path.display(), error = %e, "launch failed");
                let detail = format!("could not launch {}: {e}", self.interpreter);
                return TaskResult::failure(task, FailureReason::LaunchError, detail, e.to_string(), clock.elapsed());
            },
        };
        tracing::info!(script = %task.script_path.display(), pid = child.id(), "spawned");

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());
        let exit = wait_with_deadline(&mut child, self.timeout);
        #[cfg(unix)]
        {
            // Background children of a finished script still hold the pipes.
            if matches!(exit, Exit::Finished(_)) {
                signal_group(child.id());
            }
        }

        let stdout = stdout.recv_timeout(OUTPUT_GRACE).unwrap_or_default();
        let stderr = stderr.recv_timeout(OUTPUT_GRACE).unwrap_or_default();
        tracing::debug!(script = %task.script_path.display(), stdout_bytes = stdout.len(), "collected output");
        let excerpt = stderr_excerpt(&stderr);
        let duration = clock.elapsed();

        return match exit {
            Exit::TimedOut => {
                let detail = format!("timed out after {}s", self.timeout.as_secs());
                TaskResult::failure(task, FailureReason::Timeout, detail, excerpt, duration)
            },
            Exit::WaitFailed(e) => {
                let detail = format!("could not wait for process: {e}");
                TaskResult::failure(task, FailureReason::LaunchError, detail, excerpt, duration)
            },
            Exit::Finished(status) if !status.success() => {
                TaskResult::failure(task, FailureReason::NonzeroExit, status.to_string(), excerpt, duration)
            },
            Exit::Finished(_) => {
                let problems = verifier::verify(task, started_at);
                if problems.is_empty() {
                    TaskResult::success(task, excerpt, duration)
                } else {
                    let detail = problems.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                    TaskResult::failure(task, FailureReason::MissingArtifact, detail, excerpt, duration)
                }
            },
        };
    }

    /// Start the interpreter in its own process group with piped output.
    fn spawn(&self, task: &TaskRecord) -> std::io::Result<Child> {
        let script = task.script_path.file_name().unwrap_or(task.script_path.as_os_str());
        let mut command = Command::new(&self.interpreter);
        command
            .arg(script)
            .current_dir(&task.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            command.process_group(0);
        }
        return command.spawn();
    }
}

/// Drain a pipe on its own thread so a chatty child never blocks on a full
/// buffer. The receiver yields the bytes once the pipe closes.
fn capture<R: Read + Send + 'static>(stream: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    if let Some(mut stream) = stream {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = stream.read_to_end(&mut buf) {
                tracing::debug!(error = %e, "pipe read ended early");
            }
            let _ = tx.send(buf);
        });
    }
    return rx;
}

/// Kill the child and everything it started, then reap it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    signal_group(child.id());
    if let Err(e) = child.kill() {
        tracing::debug!(pid = child.id(), error = %e, "kill after group signal");
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = child.id(), error = %e, "failed to reap killed process");
    }
}

/// SIGKILL the process group led by `pid`. A group that is already gone is
/// not an error.
#[cfg(unix)]
fn signal_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes two integers and reads no memory owned by us.
    // The negated pid addresses the group created by `process_group(0)`.
    let rc = unsafe { kill(pgid.saturating_neg(), SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to signal process group");
        }
    }
}

/// The last few non-empty stderr lines, trimmed, newline-joined.
pub fn stderr_excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|line| return !line.is_empty()).collect();
    let start = lines.len().saturating_sub(EXCERPT_LINES);
    return lines.get(start..).unwrap_or_default().join("\n");
}

/// Poll the child until it exits or `timeout` elapses, killing it on expiry.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Exit {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Exit::Finished(status),
            Ok(None) => {},
            Err(e) => {
                kill_tree(child);
                return Exit::WaitFailed(e);
            },
        }
        if deadline.is_some_and(|deadline| return Instant::now() >= deadline) {
            tracing::warn!(pid = child.id(), timeout_secs = timeout.as_secs(), "deadline passed, killing");
            kill_tree(child);
            return Exit::TimedOut;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_keeps_last_non_empty_lines() {
        let mut stderr = String::new();
        for i in 1..=15 {
            stderr.push_str(&format!("  line {i}  \n\n"));
        }
        let excerpt = stderr_excerpt(stderr.as_bytes());
        let lines: Vec<&str> = excerpt.lines().collect();
        assert_eq!(lines.len(), EXCERPT_LINES);
        assert_eq!(lines.first(), Some(&"line 6"));
        assert_eq!(lines.last(), Some(&"line 15"));
        assert_eq!(stderr_excerpt(b""), "");
    }

    #[test]
    fn missing_interpreter_is_a_launch_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = TaskRecord {
            artifacts: Vec::new(),
            script_path: dir.path().join("chart.py"),
            working_dir: dir.path().to_path_buf(),
        };
        let executor = TaskExecutor::new("/nonexistent/lessonctl-interpreter".to_string(), Duration::from_secs(5));

        let result = executor.run(&task);
        assert!(result.is_failure());
        assert_eq!(result.reason, FailureReason::LaunchError);
        assert!(!result.stderr_excerpt.is_empty());
    }

    #[cfg(unix)]
    fn task_with_script(dir: &std::path::Path, script: &str) -> TaskRecord {
        std::fs::write(dir.join("chart.py"), script).unwrap();
        return TaskRecord {
            artifacts: vec![dir.join("chart.pdf"), dir.join("chart.png")],
            script_path: dir.join("chart.py"),
            working_dir: dir.to_path_buf(),
        };
    }

    #[cfg(unix)]
    fn sh(timeout_secs: u64) -> TaskExecutor {
        return TaskExecutor::new("sh".to_string(), Duration::from_secs(timeout_secs));
    }

    #[cfg(unix)]
    #[test]
    fn runs_in_script_directory_and_verifies_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with_script(dir.path(), "echo working >&2\ntouch chart.pdf chart.png\n");

        let result = sh(10).run(&task);
        assert_eq!(result.status, crate::types::TaskStatus::Success, "{result:?}");
        assert_eq!(result.reason, FailureReason::None);
        assert_eq!(result.stderr_excerpt, "working");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_keeps_stderr_tail() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with_script(dir.path(), "echo 'Traceback: boom' >&2\nexit 3\n");

        let result = sh(10).run(&task);
        assert_eq!(result.reason, FailureReason::NonzeroExit);
        assert_eq!(result.detail.as_deref(), Some("exit status: 3"));
        assert_eq!(result.stderr_excerpt, "Traceback: boom");
    }

    #[cfg(unix)]
    #[test]
    fn background_child_is_killed_and_stderr_kept() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with_script(dir.path(), "echo 'Traceback: real error' >&2\nsleep 20 &\nexit 1\n");

        let result = sh(10).run(&task);
        assert_eq!(result.reason, FailureReason::NonzeroExit);
        assert_eq!(result.stderr_excerpt, "Traceback: real error");
        // The pipes only close early if the background sleep is gone.
        assert!(result.duration < OUTPUT_GRACE, "took {:?}", result.duration);
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_without_png_is_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with_script(dir.path(), "touch chart.pdf\n");

        let result = sh(10).run(&task);
        assert_eq!(result.reason, FailureReason::MissingArtifact);
        assert_eq!(result.detail.as_deref(), Some("missing chart.png"));
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let task = task_with_script(dir.path(), "echo started >&2\nsleep 30 &\nsleep 30\n");

        let clock = Instant::now();
        let result = sh(1).run(&task);
        assert_eq!(result.reason, FailureReason::Timeout);
        assert_eq!(result.detail.as_deref(), Some("timed out after 1s"));
        assert_eq!(result.stderr_excerpt, "started");
        assert!(clock.elapsed() < Duration::from_secs(10), "took {:?}", clock.elapsed());
    }
}
