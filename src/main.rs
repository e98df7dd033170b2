mod build_report;
mod classifier;
mod commands;
mod config;
mod crawler;
mod diagnostics;
mod discovery;
mod error;
mod executor;
mod external;
mod extractor;
mod fragments;
mod html;
mod report;
mod resolver;
mod scheduler;
mod types;
mod verifier;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// `lessonctl charts` options.
#[derive(Args)]
struct ChartsArgs {
    /// Print discovered scripts and exit without running them
    #[arg(long)]
    dry_run: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Program used to run each chart.py [default: python3]
    #[arg(long)]
    interpreter: Option<String>,
    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,
    /// Run scripts on a bounded worker pool
    #[arg(short, long)]
    parallel: bool,
    /// Repository root containing L*/<dir>/chart.py
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Per-script wall-clock limit in seconds [default: 60]
    #[arg(long)]
    timeout: Option<u64>,
    /// Log run milestones to stderr
    #[arg(short, long)]
    verbose: bool,
    /// Worker count for --parallel [default: 4]
    #[arg(short, long)]
    workers: Option<usize>,
}

#[derive(Parser)]
#[command(name = "lessonctl", version, about = "Link checking and chart builds for course material")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every L*/<dir>/chart.py and verify chart.pdf and chart.png
    Charts(ChartsArgs),
    /// Check links, images, scripts, and anchors in a directory of HTML files
    Links(LinksArgs),
}

/// `lessonctl links` options.
#[derive(Args)]
struct LinksArgs {
    /// Root directory to crawl for *.html
    #[arg(long, default_value = ".")]
    base_path: PathBuf,
    /// Probe http(s) links over the network
    #[arg(long)]
    check_external: bool,
    /// File name that makes a directory reference valid (repeatable)
    #[arg(long, value_name = "NAME")]
    directory_index: Vec<String>,
    /// Directory or file (relative to --base-path) not to crawl (repeatable)
    #[arg(long, value_name = "PREFIX")]
    exclude: Vec<String>,
    /// Probe CDN hosts on the skip-list too
    #[arg(long, requires = "check_external")]
    force_external: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Disable ANSI colors
    #[arg(long)]
    no_color: bool,
    /// Per-probe timeout in seconds [default: 10]
    #[arg(long)]
    timeout: Option<u64>,
    /// Print valid and skipped links too
    #[arg(short, long)]
    verbose: bool,
}

/// Report format on stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Machine-readable JSON
    Json,
    /// Human-readable trace and summary
    Text,
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "lessonctl=info" } else { "lessonctl=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Charts(args) => {
            init_tracing(args.verbose);
            commands::charts(args)
        },
        Commands::Links(args) => {
            init_tracing(args.verbose);
            commands::links(args)
        },
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(2)
        },
    };
}
