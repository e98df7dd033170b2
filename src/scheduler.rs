//! Sequential and worker-pool execution of chart tasks.
//!
//! Every task gets exactly one result, stored in a slot indexed by its
//! position in discovery order. Workers share nothing but the job queue and
//! the result channel; each task runs in its own subprocess and directory.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crate::executor::TaskExecutor;
use crate::types::{FailureReason, TaskRecord, TaskResult};

/// How tasks are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bounded pool; capped at the number of tasks.
    Parallel {
        /// Requested worker count.
        workers: usize,
    },
    /// One at a time in discovery order.
    Sequential,
}

/// Observer for per-task progress lines.
///
/// Always called from the scheduling thread. `started` fires only in
/// sequential mode; `finished` fires once per task in completion order.
pub trait Progress {
    /// A task finished with `result`.
    fn finished(&mut self, result: &TaskResult);
    /// A task is about to run.
    fn started(&mut self, task: &TaskRecord);
}

/// Something that turns a task into a result.
pub trait Runner: Sync {
    /// Run one task to a terminal result.
    fn run(&self, task: &TaskRecord) -> TaskResult;
}

impl Runner for TaskExecutor {
    fn run(&self, task: &TaskRecord) -> TaskResult {
        return Self::run(self, task);
    }
}

/// Failure result for a task whose worker produced nothing.
fn lost(task: &TaskRecord, detail: String, duration: Duration) -> TaskResult {
    return TaskResult::failure(task, FailureReason::LaunchError, detail, String::new(), duration);
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    return "unknown panic".to_string();
}

/// Run every task and return results in discovery order.
///
/// No task is dropped: a panicking runner or a worker that never reports
/// yields a `launch_error` result for that task.
pub fn run_all(
    tasks: &[TaskRecord],
    runner: &dyn Runner,
    mode: Mode,
    progress: &mut dyn Progress,
) -> Vec<TaskResult> {
    return match mode {
        Mode::Parallel { workers } => run_parallel(tasks, runner, workers, progress),
        Mode::Sequential => tasks
            .iter()
            .map(|task| {
                progress.started(task);
                let result = run_guarded(runner, task);
                progress.finished(&result);
                return result;
            })
            .collect(),
    };
}

/// Run one task, converting a panic into a failure result.
fn run_guarded(runner: &dyn Runner, task: &TaskRecord) -> TaskResult {
    let clock = Instant::now();
    return match panic::catch_unwind(AssertUnwindSafe(|| return runner.run(task))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(script = %task.script_path.display(), %message, "task runner panicked");
            lost(task, format!("runner panicked: {message}"), clock.elapsed())
        },
    };
}

/// Fixed-size pool fed by a job channel. Results are collected on this
/// thread into one slot per task and reported as they arrive.
fn run_parallel(
    tasks: &[TaskRecord],
    runner: &dyn Runner,
    workers: usize,
    progress: &mut dyn Progress,
) -> Vec<TaskResult> {
    let workers = workers.min(tasks.len()).max(1);
    tracing::info!(workers, tasks = tasks.len(), "starting worker pool");

    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &TaskRecord)>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, TaskResult)>();
    for job in tasks.iter().enumerate() {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let mut slots: Vec<Option<TaskResult>> = tasks.iter().map(|_| return None).collect();

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for (index, task) in job_rx.iter() {
                    let result = run_guarded(runner, task);
                    if result_tx.send((index, result)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(result_tx);

        for (index, result) in result_rx.iter() {
            progress.finished(&result);
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }
    });

    return slots
        .into_iter()
        .zip(tasks)
        .map(|(slot, task)| {
            return slot.unwrap_or_else(|| return lost(task, "worker exited without a result".to_string(), Duration::ZERO));
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::types::TaskStatus;

    fn tasks(names: &[&str]) -> Vec<TaskRecord> {
        return names
            .iter()
            .map(|name| {
                let dir = PathBuf::from("/course").join(name);
                return TaskRecord {
                    artifacts: Vec::new(),
                    script_path: dir.join("chart.py"),
                    working_dir: dir,
                };
            })
            .collect();
    }

    /// Fails tasks whose directory name contains "bad", panics on "panic".
    struct Scripted {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new() -> Self {
            return Self { active: AtomicUsize::new(0), peak: AtomicUsize::new(0) };
        }
    }

    impl Runner for Scripted {
        fn run(&self, task: &TaskRecord) -> TaskResult {
            let now = self.active.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            self.active.fetch_sub(1, Ordering::SeqCst);

            let name = task.working_dir.to_string_lossy().into_owned();
            if name.contains("panic") {
                panic!("boom in {name}");
            }
            if name.contains("bad") {
                return TaskResult::failure(task, FailureReason::NonzeroExit, "exit status: 1".to_string(), String::new(), Duration::ZERO);
            }
            return TaskResult::success(task, String::new(), Duration::ZERO);
        }
    }

    #[derive(Default)]
    struct Recorder {
        finished: Vec<PathBuf>,
        started: Vec<PathBuf>,
    }

    impl Progress for Recorder {
        fn finished(&mut self, result: &TaskResult) {
            self.finished.push(result.script_path.clone());
        }

        fn started(&mut self, task: &TaskRecord) {
            self.started.push(task.script_path.clone());
        }
    }

    fn outcomes(results: &[TaskResult]) -> BTreeMap<PathBuf, TaskStatus> {
        return results.iter().map(|r| return (r.script_path.clone(), r.status)).collect();
    }

    #[test]
    fn sequential_runs_in_discovery_order() {
        let tasks = tasks(&["L01/a", "L01/bad", "L02/c"]);
        let runner = Scripted::new();
        let mut progress = Recorder::default();

        let results = run_all(&tasks, &runner, Mode::Sequential, &mut progress);
        let order: Vec<PathBuf> = tasks.iter().map(|t| return t.script_path.clone()).collect();
        assert_eq!(progress.started, order);
        assert_eq!(progress.finished, order);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| return r.is_failure()).count(), 1);
    }

    #[test]
    fn parallel_matches_sequential_outcomes() {
        let names = ["L01/a", "L01/bad", "L02/b", "L02/c", "L03/bad", "L03/d", "L04/e", "L04/f"];
        let tasks = tasks(&names);

        let sequential = run_all(&tasks, &Scripted::new(), Mode::Sequential, &mut Recorder::default());
        let mut progress = Recorder::default();
        let parallel = run_all(&tasks, &Scripted::new(), Mode::Parallel { workers: 4 }, &mut progress);

        assert_eq!(parallel.len(), tasks.len());
        assert_eq!(outcomes(&sequential), outcomes(&parallel));
        assert_eq!(progress.finished.len(), tasks.len());
        assert!(progress.started.is_empty());
        let in_order: Vec<&PathBuf> = parallel.iter().map(|r| return &r.script_path).collect();
        let expected: Vec<&PathBuf> = tasks.iter().map(|t| return &t.script_path).collect();
        assert_eq!(in_order, expected);
    }

    #[test]
    fn pool_never_exceeds_workers_or_tasks() {
        let runner = Scripted::new();
        run_all(&tasks(&["a", "b", "c", "d", "e", "f"]), &runner, Mode::Parallel { workers: 2 }, &mut Recorder::default());
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);

        let runner = Scripted::new();
        run_all(&tasks(&["a", "b"]), &runner, Mode::Parallel { workers: 16 }, &mut Recorder::default());
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn panicking_runner_becomes_a_failure() {
        let tasks = tasks(&["L01/a", "L01/panic", "L01/c"]);
        for mode in [Mode::Sequential, Mode::Parallel { workers: 3 }] {
            let results = run_all(&tasks, &Scripted::new(), mode, &mut Recorder::default());
            assert_eq!(results.len(), 3);
            let failed = results.get(1).unwrap();
            assert_eq!(failed.reason, FailureReason::LaunchError);
            assert!(failed.detail.as_deref().unwrap().contains("boom"), "{failed:?}");
        }
    }

    #[test]
    fn empty_task_list_is_fine() {
        let results = run_all(&[], &Scripted::new(), Mode::Parallel { workers: 4 }, &mut Recorder::default());
        assert!(results.is_empty());
    }
}
