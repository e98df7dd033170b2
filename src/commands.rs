//! Core CLI commands for lessonctl: links, charts.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::build_report::{self, ProgressPrinter, Silent};
use crate::config::{self, Config};
use crate::crawler::{self, Checkers};
use crate::diagnostics::Palette;
use crate::discovery;
use crate::error::Error;
use crate::executor::TaskExecutor;
use crate::external::{self, ExternalCheckCache, ExternalProber};
use crate::fragments::FragmentIndex;
use crate::report;
use crate::resolver::LocalResolver;
use crate::scheduler::{self, Mode, Progress};
use crate::types::TaskRecord;
use crate::{ChartsArgs, LinksArgs, OutputFormat};

/// Discover chart scripts, run them, verify artifacts, and report.
///
/// # Errors
///
/// Returns usage errors only: a bad `--root`, a malformed config, or a zero
/// worker count. Task failures are reported and reflected in the exit code.
pub fn charts(args: &ChartsArgs) -> Result<ExitCode, Error> {
    let root = existing_dir(&args.root, "--root")?;
    let config = Config::load(&root)?.charts;

    let interpreter = args.interpreter.clone().unwrap_or(config.interpreter);
    let timeout = args.timeout.map_or(config.timeout, |secs| return Duration::from_secs(secs.max(1)));
    let workers = config::validate_workers(args.workers.unwrap_or(config.workers))?;
    let mode = if args.parallel { Mode::Parallel { workers } } else { Mode::Sequential };
    let palette = Palette::detect(args.no_color);

    let tasks = discovery::discover(&root);
    if args.dry_run {
        return print_task_list(&tasks, &root, args.format);
    }
    if args.format == OutputFormat::Text {
        println!("Found {} chart scripts", tasks.len());
        if tasks.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }
        println!();
    }

    let executor = TaskExecutor::new(interpreter, timeout);
    let mut progress: Box<dyn Progress> = match args.format {
        OutputFormat::Json => Box::new(Silent),
        OutputFormat::Text => Box::new(ProgressPrinter::new(std::io::stdout(), root.clone(), palette)),
    };

    let clock = Instant::now();
    let results = scheduler::run_all(&tasks, &executor, mode, progress.as_mut());
    let elapsed = clock.elapsed();

    match args.format {
        OutputFormat::Json => println!("{}", build_report::render_json(&results, &root, elapsed)?),
        OutputFormat::Text => print!("{}", build_report::render_summary(&results, &root, elapsed, palette)),
    }
    return Ok(build_report::summarize(&results).exit_code());
}

/// Canonicalize the root given by `flag` and check that it is a directory.
///
/// # Errors
///
/// Returns `Error::DirectoryNotFound` or `Error::NotADirectory`.
fn existing_dir(path: &Path, flag: &'static str) -> Result<PathBuf, Error> {
    let canonical = match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::DirectoryNotFound { flag, path: path.to_path_buf() });
        },
        Err(e) => return Err(Error::Io(e)),
    };
    if !canonical.is_dir() {
        return Err(Error::NotADirectory { flag, path: path.to_path_buf() });
    }
    return Ok(canonical);
}

/// Crawl HTML under `--base-path`, check every link, and report.
///
/// # Errors
///
/// Returns usage errors only: a bad `--base-path`, a malformed config, or
/// `--check-external` without HTTP support. Broken links are reported and
/// reflected in the exit code.
pub fn links(args: &LinksArgs) -> Result<ExitCode, Error> {
    let root = existing_dir(&args.base_path, "--base-path")?;
    let mut config = Config::load(&root)?.links;
    config.directory_index.extend(args.directory_index.iter().cloned());
    config.exclude.extend(args.exclude.iter().cloned());
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs.clamp(1, 60));
    }

    // Usage errors surface before any report output.
    let probe = if args.check_external { Some(external::http_probe(config.timeout)?) } else { None };
    let resolver = LocalResolver::new(&root, config.directory_index.clone())
        .ok_or_else(|| return Error::DirectoryNotFound { flag: "--base-path", path: root.clone() })?;

    let cache = ExternalCheckCache::new();
    let prober = probe.as_deref().map(|probe| {
        return ExternalProber::new(probe, &cache, config.skip_hosts.clone(), args.force_external, config.external_workers);
    });
    let mut fragments = FragmentIndex::new();
    let mut checkers = Checkers { external: prober.as_ref(), fragments: &mut fragments, resolver: &resolver };

    let files = crawler::html_files(&root, &config);
    let reports = crawler::crawl(&files, &mut checkers);
    if !cache.is_empty() {
        tracing::debug!(entries = cache.len(), hits = cache.hits(), "external check cache");
    }
    tracing::debug!(files = fragments.parse_count(), "anchor index");

    let summary = report::summarize(&reports);
    match args.format {
        OutputFormat::Json => println!("{}", report::render_json(&reports, summary, &root)?),
        OutputFormat::Text => {
            let palette = Palette::detect(args.no_color);
            print!("{}", report::render_text(&reports, summary, &root, args.verbose, palette));
        },
    }
    return Ok(summary.exit_code());
}

/// `--dry-run`: list what would run, in run order.
///
/// # Errors
///
/// Returns `Error::Json` if the JSON listing cannot be serialized.
fn print_task_list(tasks: &[TaskRecord], root: &Path, format: OutputFormat) -> Result<ExitCode, Error> {
    let scripts: Vec<String> = tasks
        .iter()
        .map(|task| {
            let shown = task.script_path.strip_prefix(root).unwrap_or(&task.script_path);
            return shown.display().to_string();
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&scripts)?),
        OutputFormat::Text => {
            println!("Found {} chart scripts", scripts.len());
            for script in &scripts {
                println!("  {script}");
            }
        },
    }
    return Ok(ExitCode::SUCCESS);
}
