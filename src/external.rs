//! External URL checks: skip-list, per-run cache, bounded concurrent probing.
//!
//! This is the only part of link validation that touches the network. Every
//! probe runs under a hard timeout and a failing host only breaks the links
//! that point at it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};

use url::Url;

use crate::error::Error;
use crate::types::Verdict;

/// Static hosts assumed reachable unless `--force-external` is given.
pub const DEFAULT_SKIP_HOSTS: &[&str] = &[
    "cdn.jsdelivr.net",
    "cdnjs.cloudflare.com",
    "code.jquery.com",
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "unpkg.com",
];

/// Upper bound on concurrently outstanding probes.
pub const DEFAULT_WORKERS: usize = 8;

/// What a single probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Failure description; `None` for 2xx/3xx.
    pub reason: Option<String>,
    /// Final HTTP status, absent on network errors.
    pub status_code: Option<u16>,
}

impl ProbeOutcome {
    /// A request that never produced a status.
    pub fn failed(reason: impl Into<String>) -> Self {
        return Self { reason: Some(reason.into()), status_code: None };
    }

    /// Classify an HTTP status: 2xx and 3xx are valid.
    pub fn from_status(code: u16, canonical_reason: Option<&str>) -> Self {
        if (200..400).contains(&code) {
            return Self { reason: None, status_code: Some(code) };
        }
        let reason = match canonical_reason {
            Some(text) => format!("HTTP {code} {text}"),
            None => format!("HTTP {code}"),
        };
        return Self { reason: Some(reason), status_code: Some(code) };
    }

    /// Whether the URL answered with a 2xx or 3xx status.
    pub fn is_valid(&self) -> bool {
        return self.status_code.is_some_and(|code| return (200..400).contains(&code));
    }

    /// Convert into a link verdict.
    pub fn verdict(&self) -> Verdict {
        if self.is_valid() {
            return Verdict::valid();
        }
        return Verdict::broken(self.reason.clone().unwrap_or_else(|| return "probe failed".to_string()));
    }
}

/// Network access seam. The HTTP implementation lives behind the `external`
/// feature; tests substitute their own.
pub trait Probe: Send + Sync {
    /// Request `url` (fragment already removed) and report what happened.
    fn probe(&self, url: &Url) -> ProbeOutcome;
}

/// A cached probe result.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// When the probe finished.
    checked_at: SystemTime,
    /// What it observed.
    outcome: ProbeOutcome,
}

/// Run-scoped map from normalized URL to probe outcome.
///
/// Safe to share between probing threads. When two threads race on the same
/// key the first stored outcome wins and both callers see it.
#[derive(Debug, Default)]
pub struct ExternalCheckCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU32,
}

impl ExternalCheckCache {
    /// An empty cache.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Cached outcome for `key`, counting a hit when present.
    pub fn get(&self, key: &str) -> Option<ProbeOutcome> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries.get(key)?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        let age = entry.checked_at.elapsed().unwrap_or_default();
        tracing::debug!(url = key, age_ms = age.as_millis(), "external cache hit");
        return Some(entry.outcome.clone());
    }

    /// Number of lookups answered from the cache.
    pub fn hits(&self) -> u32 {
        return self.hits.load(Ordering::Relaxed);
    }

    /// Whether nothing has been probed yet.
    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Number of distinct URLs probed.
    pub fn len(&self) -> usize {
        return self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len();
    }

    /// Store `outcome` unless another thread got there first; return the stored value.
    pub fn record(&self, key: String, outcome: ProbeOutcome) -> ProbeOutcome {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = entries.entry(key).or_insert_with(|| {
            return CacheEntry { checked_at: SystemTime::now(), outcome };
        });
        return entry.outcome.clone();
    }
}

/// Cache key: scheme, host, explicit port, and path. Query and fragment are ignored.
pub fn cache_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    return match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    };
}

/// Checks external URLs against the skip-list, the cache, and the network.
pub struct ExternalProber<'a> {
    cache: &'a ExternalCheckCache,
    /// Probe skip-listed hosts anyway.
    force: bool,
    probe: &'a dyn Probe,
    skip_hosts: Vec<String>,
    workers: usize,
}

impl<'a> ExternalProber<'a> {
    /// Assemble a prober from its collaborators.
    pub fn new(
        probe: &'a dyn Probe,
        cache: &'a ExternalCheckCache,
        skip_hosts: Vec<String>,
        force: bool,
        workers: usize,
    ) -> Self {
        return Self { cache, force, probe, skip_hosts, workers: workers.max(1) };
    }

    /// Check one URL. Never panics, never blocks past the probe's timeout.
    pub fn check(&self, raw: &str) -> Verdict {
        let mut url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => return Verdict::broken(format!("Invalid URL: {e}")),
        };

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        if !self.force && self.is_skipped_host(&host) {
            return Verdict::skipped(format!("CDN host {host} (skip-list)"));
        }

        let key = cache_key(&url);
        if let Some(outcome) = self.cache.get(&key) {
            return outcome.verdict();
        }

        url.set_fragment(None);
        tracing::debug!(url = %url, "probing");
        let outcome = self.probe.probe(&url);
        return self.cache.record(key, outcome).verdict();
    }

    /// Check many URLs with at most `workers` probes in flight.
    /// Duplicate inputs are probed once; the result has one entry per distinct URL.
    pub fn check_all(&self, urls: &[String]) -> HashMap<String, Verdict> {
        let unique: BTreeSet<&String> = urls.iter().collect();
        let workers = self.workers.min(unique.len());
        tracing::info!(urls = unique.len(), workers, "checking external links");

        if workers <= 1 {
            return unique
                .into_iter()
                .map(|url| return (url.clone(), self.check(url)))
                .collect();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<&String>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(String, Verdict)>();
        for url in unique {
            let _ = job_tx.send(url);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                scope.spawn(move || {
                    for url in jobs.iter() {
                        let _ = results.send((url.clone(), self.check(url)));
                    }
                });
            }
        });
        drop(result_tx);

        return result_rx.iter().collect();
    }

    /// Whether `host` is a skip-listed host or a subdomain of one.
    fn is_skipped_host(&self, host: &str) -> bool {
        return self.skip_hosts.iter().any(|entry| {
            return host == entry
                || host.strip_suffix(entry.as_str()).is_some_and(|prefix| return prefix.ends_with('.'));
        });
    }
}

/// Construct the network probe for `--check-external`.
///
/// # Errors
///
/// Returns `Error::HttpClient` if the client cannot be built.
#[cfg(feature = "external")]
pub fn http_probe(timeout: Duration) -> Result<Box<dyn Probe>, Error> {
    return Ok(Box::new(http::HttpProbe::new(timeout)?));
}

/// Construct the network probe for `--check-external`.
///
/// # Errors
///
/// Always returns `Error::ExternalUnavailable`: HTTP support was compiled out.
#[cfg(not(feature = "external"))]
pub fn http_probe(timeout: Duration) -> Result<Box<dyn Probe>, Error> {
    let _ = timeout;
    return Err(Error::ExternalUnavailable);
}

#[cfg(feature = "external")]
mod http {
    use std::time::Duration;

    use url::Url;

    use super::{Probe, ProbeOutcome};
    use crate::error::Error;

    const USER_AGENT: &str = concat!("lessonctl/", env!("CARGO_PKG_VERSION"));

    /// Blocking HEAD-then-GET prober.
    pub(super) struct HttpProbe {
        client: reqwest::blocking::Client,
        timeout: Duration,
    }

    impl HttpProbe {
        /// Build a client with a hard per-request timeout.
        pub(super) fn new(timeout: Duration) -> Result<Self, Error> {
            let client = reqwest::blocking::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
                .connect_timeout(timeout)
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .map_err(|e| return Error::HttpClient { reason: e.to_string() })?;
            return Ok(Self { client, timeout });
        }

        fn describe(&self, err: &reqwest::Error) -> String {
            if err.is_timeout() {
                return format!("Timed out after {}s", self.timeout.as_secs());
            }
            if err.is_connect() {
                return format!("Connection failed: {err}");
            }
            return format!("Request failed: {err}");
        }
    }

    impl Probe for HttpProbe {
        fn probe(&self, url: &Url) -> ProbeOutcome {
            let response = match self.client.head(url.as_str()).send() {
                // Some servers reject HEAD outright.
                Ok(head) if matches!(head.status().as_u16(), 405 | 501) => {
                    self.client.get(url.as_str()).send()
                },
                other => other,
            };
            return match response {
                Ok(response) => {
                    let status = response.status();
                    ProbeOutcome::from_status(status.as_u16(), status.canonical_reason())
                },
                Err(e) => ProbeOutcome::failed(self.describe(&e)),
            };
        }
    }

}
