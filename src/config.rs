use std::path::Path;
use std::time::Duration;

use crate::error::Error;
use crate::external::{DEFAULT_SKIP_HOSTS, DEFAULT_WORKERS};

/// Name of the optional project config file.
pub const CONFIG_FILE: &str = ".lessonctl.toml";

/// Project configuration loaded from `.lessonctl.toml`.
/// Command-line flags are applied on top by the command functions.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Chart build settings.
    pub charts: ChartsConfig,
    /// Link validation settings.
    pub links: LinksConfig,
}

/// Settings for `lessonctl charts`.
#[derive(Debug, Clone)]
pub struct ChartsConfig {
    /// Program that runs each `chart.py`.
    pub interpreter: String,
    /// Per-task wall-clock limit.
    pub timeout: Duration,
    /// Worker count for `--parallel` when `--workers` is not given.
    pub workers: usize,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        return Self {
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(60),
            workers: 4,
        };
    }
}

/// Settings for `lessonctl links`.
#[derive(Debug, Clone)]
pub struct LinksConfig {
    /// Index file names that make a directory reference valid. Empty = never.
    pub directory_index: Vec<String>,
    /// Directory or file paths (relative to the base path) not to crawl.
    pub exclude: Vec<String>,
    /// Maximum concurrent external probes.
    pub external_workers: usize,
    /// Hosts assumed reachable and not probed.
    pub skip_hosts: Vec<String>,
    /// Hard timeout for each external probe.
    pub timeout: Duration,
}

impl Default for LinksConfig {
    fn default() -> Self {
        return Self {
            directory_index: Vec::new(),
            exclude: Vec::new(),
            external_workers: DEFAULT_WORKERS,
            skip_hosts: DEFAULT_SKIP_HOSTS.iter().map(|host| return (*host).to_string()).collect(),
            timeout: Duration::from_secs(10),
        };
    }
}

impl LinksConfig {
    /// Check whether an HTML file (path relative to the base path) should be crawled.
    /// Exclusions match whole path components: `drafts` covers `drafts/a.html`
    /// but not `drafts2/a.html`.
    pub fn should_crawl(&self, relative_path: &Path) -> bool {
        return !self.exclude.iter().any(|prefix| return relative_path.starts_with(prefix.as_str()));
    }
}

/// Raw TOML structure for `.lessonctl.toml`.
#[derive(serde::Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct LessonctlToml {
    charts: RawCharts,
    links: RawLinks,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawCharts {
    interpreter: Option<String>,
    timeout_secs: Option<u64>,
    workers: Option<usize>,
}

#[derive(serde::Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RawLinks {
    directory_index: Vec<String>,
    exclude: Vec<String>,
    external_workers: Option<usize>,
    skip_hosts: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load config from `.lessonctl.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist. Returns an error if the
    /// file exists but is malformed; a config the user wrote is never
    /// silently ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::ConfigInvalid` if the TOML is malformed, or
    /// `Error::InvalidWorkers` if a worker count is zero.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };

        let raw: LessonctlToml =
            toml::from_str(&content).map_err(|source| return Error::ConfigInvalid { path, source })?;
        return Self::from_raw(raw);
    }

    /// Apply raw TOML values over the defaults.
    fn from_raw(raw: LessonctlToml) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(interpreter) = raw.charts.interpreter {
            config.charts.interpreter = interpreter;
        }
        if let Some(secs) = raw.charts.timeout_secs {
            config.charts.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(workers) = raw.charts.workers {
            config.charts.workers = validate_workers(workers)?;
        }

        config.links.directory_index = raw.links.directory_index;
        config.links.exclude = raw.links.exclude;
        if let Some(workers) = raw.links.external_workers {
            config.links.external_workers = validate_workers(workers)?;
        }
        if let Some(hosts) = raw.links.skip_hosts {
            config.links.skip_hosts = hosts.into_iter().map(|h| return h.to_ascii_lowercase()).collect();
        }
        if let Some(secs) = raw.links.timeout_secs {
            config.links.timeout = Duration::from_secs(secs.clamp(1, 60));
        }

        return Ok(config);
    }
}

/// Reject a zero worker count.
///
/// # Errors
///
/// Returns `Error::InvalidWorkers` for zero.
pub fn validate_workers(count: usize) -> Result<usize, Error> {
    if count == 0 {
        return Err(Error::InvalidWorkers { count });
    }
    return Ok(count);
}
