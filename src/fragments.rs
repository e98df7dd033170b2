//! Per-run cache of anchor ids, one parse per distinct file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::html::TagScanner;

/// Lazily built map from HTML file to the anchor ids it defines.
///
/// Constructed once per run and passed to the crawl; nothing outlives the
/// process. Read failures are cached too so a broken target is not re-read
/// for every link pointing at it.
#[derive(Debug, Default)]
pub struct FragmentIndex {
    /// Parsed anchor sets, or the reason the file could not be parsed.
    entries: HashMap<PathBuf, Result<HashSet<String>, String>>,
    /// Number of files actually read and tokenized.
    parses: u32,
}

impl FragmentIndex {
    /// An empty index.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Whether `file` defines an element with `id="fragment"` (or an `<a name>`).
    ///
    /// The first query for a file parses it; later queries are set lookups.
    /// An empty fragment (bare `#`) is always present: top of page.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParseFailed` if the file cannot be read.
    pub fn has_id(&mut self, file: &Path, fragment: &str) -> Result<bool, Error> {
        if fragment.is_empty() {
            return Ok(true);
        }

        let parses = &mut self.parses;
        let entry = self.entries.entry(file.to_path_buf()).or_insert_with(|| {
            *parses = parses.saturating_add(1);
            let parsed = collect_anchor_ids(file);
            tracing::debug!(file = %file.display(), ok = parsed.is_ok(), "indexed anchors");
            return parsed;
        });

        return match entry {
            Ok(ids) => Ok(ids.contains(fragment)),
            Err(reason) => Err(Error::ParseFailed {
                file: file.to_path_buf(),
                reason: reason.clone(),
            }),
        };
    }

    /// How many distinct files have been parsed so far.
    pub const fn parse_count(&self) -> u32 {
        return self.parses;
    }
}

/// Read a file and gather every `id` value, plus `name` on `<a>` elements.
fn collect_anchor_ids(file: &Path) -> Result<HashSet<String>, String> {
    let bytes = std::fs::read(file).map_err(|e| return e.to_string())?;
    let content = String::from_utf8_lossy(&bytes);

    let mut ids = HashSet::new();
    for tag in TagScanner::new(&content) {
        if let Some(id) = tag.attribute("id") {
            ids.insert(id.to_string());
        }
        if tag.name == "a"
            && let Some(name) = tag.attribute("name")
        {
            ids.insert(name.to_string());
        }
    }
    return Ok(ids);
}
