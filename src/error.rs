/// Crate-level error types for usage and environment failures.
///
/// `ParseFailed` is the one per-link variant: `FragmentIndex` returns it and
/// the crawler records it on the link as `LinkStatus::Broken`. Every other
/// per-link or per-task failure is data (`LinkStatus::Broken`,
/// `TaskStatus::Failure`) and never reaches `main`.
use std::path::PathBuf;

/// Every variant names the path, value, or reason that caused it so the
/// diagnostic printed to stderr is actionable without re-running.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `.lessonctl.toml` exists but cannot be deserialized.
    #[error("invalid config {}: {source}", path.display())]
    ConfigInvalid {
        /// Path to the malformed config file.
        path: PathBuf,
        /// The wrapped TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// A root directory passed on the command line does not exist.
    #[error("directory not found: {}", path.display())]
    DirectoryNotFound {
        /// Flag that supplied the path, e.g. `--base-path`.
        flag: &'static str,
        /// Path as given by the user.
        path: PathBuf,
    },

    /// `--check-external` was requested but HTTP support was compiled out.
    #[error("external link checking is unavailable: lessonctl was built without the `external` feature")]
    ExternalUnavailable,

    /// The HTTP client for external probing could not be constructed.
    #[error("http client setup failed: {reason}")]
    HttpClient {
        /// Description of the construction failure.
        reason: String,
    },

    /// Worker count outside the accepted range.
    #[error("invalid worker count {count}: must be at least 1")]
    InvalidWorkers {
        /// The rejected worker count.
        count: usize,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON report serialization failed.
    #[error("json serialize: {0}")]
    Json(
        /// The wrapped serde_json error.
        #[from]
        serde_json::Error,
    ),

    /// A root path exists but is a file, not a directory.
    #[error("not a directory: {}", path.display())]
    NotADirectory {
        /// Flag that supplied the path, e.g. `--root`.
        flag: &'static str,
        /// Path as given by the user.
        path: PathBuf,
    },

    /// A file could not be read or tokenized for anchor ids.
    #[error("could not parse target for fragments: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },
}
