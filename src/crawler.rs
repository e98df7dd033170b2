//! Site crawl: walk HTML files, extract links, dispatch each to its checker.
//!
//! Files are processed sequentially in path order. External links are
//! collected during the walk and probed together at the end so the cache and
//! the worker bound apply across the whole site.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::classifier::{Target, classify};
use crate::config::LinksConfig;
use crate::external::ExternalProber;
use crate::extractor::{RawLink, extract_links};
use crate::fragments::FragmentIndex;
use crate::resolver::{LocalResolver, Resolution};
use crate::types::{LinkRecord, LinkStatus, Verdict};

/// The checkers a crawl dispatches to. Caches are owned by the caller and
/// live for one run.
pub struct Checkers<'a> {
    /// Network prober; `None` when `--check-external` is off.
    pub external: Option<&'a ExternalProber<'a>>,
    /// Anchor id cache.
    pub fragments: &'a mut FragmentIndex,
    /// Filesystem resolver.
    pub resolver: &'a LocalResolver,
}

/// Everything found in one HTML file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Set when the file itself could not be read; `links` is then empty.
    pub error: Option<String>,
    /// Links in document order, each with its verdict.
    pub links: Vec<LinkRecord>,
    /// Absolute path of the HTML file.
    pub path: PathBuf,
}

impl FileReport {
    /// Broken links in this file; an unreadable file counts as one.
    pub fn broken_count(&self) -> usize {
        let links = self.links.iter().filter(|l| return l.status == LinkStatus::Broken).count();
        return links.saturating_add(usize::from(self.error.is_some()));
    }
}

/// Extract and check the links of one file. Read failures are recorded on
/// the report, never propagated.
fn check_file(
    path: &Path,
    resolver: &LocalResolver,
    fragments: &mut FragmentIndex,
    external_enabled: bool,
) -> FileReport {
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "could not read file");
            return FileReport {
                error: Some(format!("could not read file: {e}")),
                links: Vec::new(),
                path: path.to_path_buf(),
            };
        },
    };

    let links = extract_links(&content)
        .map(|raw| return check_link(path, raw, resolver, fragments, external_enabled))
        .collect();

    return FileReport { error: None, links, path: path.to_path_buf() };
}

/// Check an anchor in `file`, turning parse failures into a broken verdict.
fn check_fragment(fragments: &mut FragmentIndex, file: &Path, id: &str) -> Verdict {
    return match fragments.has_id(file, id) {
        Ok(true) => Verdict::valid(),
        Ok(false) => Verdict::broken(format!("Fragment not found: #{id} in {}", file.display())),
        Err(e) => Verdict::broken(e.to_string()),
    };
}

/// Classify one link and run the checker its kind selects. External links
/// stay pending when probing is enabled.
fn check_link(
    source: &Path,
    raw: RawLink,
    resolver: &LocalResolver,
    fragments: &mut FragmentIndex,
    external_enabled: bool,
) -> LinkRecord {
    tracing::trace!(tag = %raw.tag, attribute = raw.attribute, line = raw.line, target = %raw.target, "link");
    let target = classify(&raw.target);
    let mut record = LinkRecord::pending(source.to_path_buf(), raw.line, raw.target, target.kind());

    match target {
        Target::External { .. } => {
            if !external_enabled {
                record.settle(Verdict::skipped("external check disabled"));
            }
        },
        Target::Fragment { id } => record.settle(check_fragment(fragments, source, &id)),
        Target::LocalFile { fragment, path } => match resolver.resolve(source, &path) {
            // A missing file is reported once; its fragment is never looked up.
            Resolution::Missing { path, reason } => {
                record.resolved_path = path;
                record.settle(Verdict::broken(reason));
            },
            Resolution::Found(found) => {
                let verdict = match fragment {
                    Some(id) if is_html(&found) => check_fragment(fragments, &found, &id),
                    _ => Verdict::valid(),
                };
                record.resolved_path = Some(found);
                record.settle(verdict);
            },
        },
        Target::Skip { reason } => record.settle(Verdict::skipped(reason)),
    }

    return record;
}

/// Check every link in `files`, returning one report per file in input order.
pub fn crawl(files: &[PathBuf], checkers: &mut Checkers<'_>) -> Vec<FileReport> {
    tracing::info!(files = files.len(), "crawling");
    let external_enabled = checkers.external.is_some();

    let mut reports: Vec<FileReport> = files
        .iter()
        .map(|file| return check_file(file, checkers.resolver, checkers.fragments, external_enabled))
        .collect();

    if let Some(prober) = checkers.external {
        settle_external(&mut reports, prober);
    }

    tracing::info!(anchor_files = checkers.fragments.parse_count(), "crawl finished");
    return reports;
}

/// All `*.html`/`*.htm` files under `root`, sorted by path, minus exclusions.
/// Symlinks are followed; unreadable entries are logged and skipped.
pub fn html_files(root: &Path, config: &LinksConfig) -> Vec<PathBuf> {
    return WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
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
        .filter(|entry| return entry.file_type().is_file() && is_html(entry.path()))
        .filter(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            return config.should_crawl(relative);
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
}

/// Whether a path names an HTML document.
pub fn is_html(path: &Path) -> bool {
    return path
        .extension()
        .and_then(|ext| return ext.to_str())
        .is_some_and(|ext| return ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
}

/// Probe URL for a record still waiting on the external checker.
fn pending_url(record: &LinkRecord) -> Option<String> {
    if record.status != LinkStatus::Pending {
        return None;
    }
    return match classify(&record.raw_target) {
        Target::External { url } => Some(url),
        _ => None,
    };
}

/// Probe every pending external link and settle its record.
fn settle_external(reports: &mut [FileReport], prober: &ExternalProber<'_>) {
    let urls: Vec<String> = reports
        .iter()
        .flat_map(|report| return report.links.iter())
        .filter_map(pending_url)
        .collect();
    if urls.is_empty() {
        return;
    }

    let verdicts = prober.check_all(&urls);
    for record in reports.iter_mut().flat_map(|report| return report.links.iter_mut()) {
        if let Some(url) = pending_url(record) {
            let verdict = verdicts
                .get(&url)
                .cloned()
                .unwrap_or_else(|| return Verdict::broken("external check did not complete"));
            record.settle(verdict);
        }
    }
}
