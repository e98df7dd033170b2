//! Local file resolution: map a link target to a path on disk and check it.

use std::path::{Path, PathBuf};

use url::Url;

/// Result of resolving one local target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The target exists. For directory references this is the index file.
    Found(PathBuf),
    /// The target is absent or unusable.
    Missing {
        /// Absolute path the target mapped to, when one could be computed.
        path: Option<PathBuf>,
        /// Diagnostic shown in the report.
        reason: String,
    },
}

/// Resolves local targets relative to the referencing file's directory.
/// Targets starting with `/` resolve against the site root instead.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    /// Index file names that make a directory reference valid.
    directory_index: Vec<String>,
    /// Site root as a `file:` directory URL.
    root: Url,
}

impl LocalResolver {
    /// Build a resolver for a site rooted at `root`, which must be absolute.
    /// Returns `None` when `root` cannot be expressed as a file URL.
    pub fn new(root: &Path, directory_index: Vec<String>) -> Option<Self> {
        let root = Url::from_directory_path(root).ok()?;
        return Some(Self { directory_index, root });
    }

    /// Resolve `target` as written in `source_file` and check that it exists.
    ///
    /// Symlinks are followed. A directory is only valid when one of the
    /// configured index files exists inside it. Resolving the same target
    /// twice gives the same answer.
    pub fn resolve(&self, source_file: &Path, target: &str) -> Resolution {
        let Some(path) = self.target_path(source_file, target) else {
            return Resolution::Missing {
                path: None,
                reason: format!("Cannot resolve path: {target}"),
            };
        };

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(_) => {
                return Resolution::Missing {
                    reason: format!("File not found: {}", path.display()),
                    path: Some(path),
                };
            },
        };

        if !metadata.is_dir() {
            return Resolution::Found(path);
        }

        let index = self
            .directory_index
            .iter()
            .map(|name| return path.join(name))
            .find(|candidate| return candidate.is_file());
        return match index {
            Some(index) => Resolution::Found(index),
            None => Resolution::Missing {
                reason: format!("Directory reference without index file: {}", path.display()),
                path: Some(path),
            },
        };
    }

    /// Compute the absolute, percent-decoded path a target maps to.
    fn target_path(&self, source_file: &Path, target: &str) -> Option<PathBuf> {
        let joined = match target.strip_prefix('/') {
            Some(root_relative) => self.root.join(root_relative.trim_start_matches('/')).ok()?,
            None => {
                let source_dir = Url::from_directory_path(source_file.parent()?).ok()?;
                source_dir.join(target).ok()?
            },
        };
        return joined.to_file_path().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("L01/charts")).unwrap();
        std::fs::create_dir_all(root.join("assets/empty")).unwrap();
        std::fs::write(root.join("index.html"), "<html></html>").unwrap();
        std::fs::write(root.join("L01/index.html"), "<html></html>").unwrap();
        std::fs::write(root.join("L01/charts/chart one.png"), "png").unwrap();
        return (dir, root);
    }

    #[test]
    fn resolves_relative_to_source_directory() {
        let (_dir, root) = site();
        let resolver = LocalResolver::new(&root, Vec::new()).unwrap();
        let source = root.join("L01/index.html");

        assert_eq!(
            resolver.resolve(&source, "charts/chart%20one.png"),
            Resolution::Found(root.join("L01/charts/chart one.png"))
        );
        assert_eq!(resolver.resolve(&source, "../index.html"), Resolution::Found(root.join("index.html")));
        assert_eq!(resolver.resolve(&source, "/index.html"), Resolution::Found(root.join("index.html")));
    }

    #[test]
    fn missing_file_names_the_resolved_path() {
        let (_dir, root) = site();
        let resolver = LocalResolver::new(&root, Vec::new()).unwrap();
        let source = root.join("L01/index.html");

        let Resolution::Missing { path, reason } = resolver.resolve(&source, "nope.html") else {
            panic!("expected missing");
        };
        assert_eq!(path, Some(root.join("L01/nope.html")));
        assert!(reason.starts_with("File not found: "), "{reason}");
        assert!(reason.ends_with("nope.html"), "{reason}");
    }

    #[test]
    fn directories_need_a_configured_index() {
        let (_dir, root) = site();
        let source = root.join("index.html");

        let strict = LocalResolver::new(&root, Vec::new()).unwrap();
        let Resolution::Missing { reason, .. } = strict.resolve(&source, "L01/") else {
            panic!("directory should be broken by default");
        };
        assert!(reason.starts_with("Directory reference without index file"), "{reason}");

        let lenient = LocalResolver::new(&root, vec!["index.html".to_string()]).unwrap();
        assert_eq!(lenient.resolve(&source, "L01/"), Resolution::Found(root.join("L01/index.html")));
        assert!(matches!(lenient.resolve(&source, "assets/empty"), Resolution::Missing { .. }));
    }

    #[test]
    fn resolution_is_idempotent() {
        let (_dir, root) = site();
        let resolver = LocalResolver::new(&root, Vec::new()).unwrap();
        let source = root.join("index.html");
        assert_eq!(resolver.resolve(&source, "L01/index.html"), resolver.resolve(&source, "L01/index.html"));
        assert_eq!(resolver.resolve(&source, "gone.css"), resolver.resolve(&source, "gone.css"));
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks() {
        let (_dir, root) = site();
        std::os::unix::fs::symlink(root.join("index.html"), root.join("home.html")).unwrap();
        std::os::unix::fs::symlink(root.join("missing.html"), root.join("dangling.html")).unwrap();
        let resolver = LocalResolver::new(&root, Vec::new()).unwrap();
        let source = root.join("index.html");

        assert!(matches!(resolver.resolve(&source, "home.html"), Resolution::Found(_)));
        assert!(matches!(resolver.resolve(&source, "dangling.html"), Resolution::Missing { .. }));
    }
}
