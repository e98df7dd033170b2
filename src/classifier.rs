//! Pure classification of raw link targets into checker buckets.

use crate::types::LinkKind;

/// A raw target split into the parts its checker needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Absolute network URL (protocol-relative targets gain `https:`).
    External {
        /// URL as it will be probed.
        url: String,
    },
    /// Anchor within the same document. Empty for a bare `#`.
    Fragment {
        /// Fragment without the leading `#`.
        id: String,
    },
    /// Filesystem reference, query string removed.
    LocalFile {
        /// Fragment suffix, if the target carried one.
        fragment: Option<String>,
        /// Path portion, still percent-encoded.
        path: String,
    },
    /// Never checked.
    Skip {
        /// Why the target is skipped.
        reason: &'static str,
    },
}

impl Target {
    /// The checker bucket this target belongs to.
    pub const fn kind(&self) -> LinkKind {
        return match self {
            Self::External { .. } => LinkKind::External,
            Self::Fragment { .. } => LinkKind::Fragment,
            Self::LocalFile { .. } => LinkKind::LocalFile,
            Self::Skip { .. } => LinkKind::Skip,
        };
    }
}

/// Classify a raw `href`/`src` value. Deterministic, no I/O.
pub fn classify(raw: &str) -> Target {
    let raw = raw.trim();
    if raw.is_empty() {
        return Target::Skip { reason: "empty link" };
    }
    if let Some(id) = raw.strip_prefix('#') {
        return Target::Fragment { id: id.to_string() };
    }
    if raw.starts_with("//") {
        return Target::External { url: format!("https:{raw}") };
    }

    if let Some(scheme) = uri_scheme(raw) {
        return match scheme.as_str() {
            "http" | "https" => Target::External { url: raw.to_string() },
            "javascript" => Target::Skip { reason: "javascript link" },
            "mailto" => Target::Skip { reason: "mailto link" },
            "tel" => Target::Skip { reason: "tel link" },
            _ => Target::Skip { reason: "unsupported scheme" },
        };
    }

    let (before_fragment, fragment) = match raw.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment.to_string())),
        None => (raw, None),
    };
    let path = before_fragment.split_once('?').map_or(before_fragment, |(path, _)| return path);

    if path.is_empty() {
        return match fragment {
            Some(id) => Target::Fragment { id },
            None => Target::Skip { reason: "query-only link" },
        };
    }

    return Target::LocalFile { fragment, path: path.to_string() };
}

/// Lowercased URI scheme, if the target starts with one.
///
/// Single-letter schemes are treated as Windows drive letters, not schemes.
fn uri_scheme(raw: &str) -> Option<String> {
    let colon = raw.find(':')?;
    let candidate = raw.get(..colon)?;
    if candidate.len() < 2 || candidate.contains(['/', '?', '#']) {
        return None;
    }
    let mut chars = candidate.chars();
    let starts_alpha = chars.next().is_some_and(|c| return c.is_ascii_alphabetic());
    let rest_valid = chars.all(|c| return c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !(starts_alpha && rest_valid) {
        return None;
    }
    return Some(candidate.to_ascii_lowercase());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_schemes_never_reach_a_checker() {
        for raw in ["mailto:a@b.c", "MAILTO:x@y.z", "tel:+15551234", "javascript:void(0)", "javascript:"] {
            assert_eq!(classify(raw).kind(), LinkKind::Skip, "{raw}");
        }
    }

    #[test]
    fn http_and_protocol_relative_are_external() {
        assert_eq!(
            classify("https://example.com/a#b"),
            Target::External { url: "https://example.com/a#b".to_string() }
        );
        assert_eq!(
            classify("//cdn.example.com/lib.js"),
            Target::External { url: "https://cdn.example.com/lib.js".to_string() }
        );
        assert_eq!(classify("HTTP://EXAMPLE.COM").kind(), LinkKind::External);
    }

    #[test]
    fn hash_prefix_is_same_file_fragment() {
        assert_eq!(classify("#results"), Target::Fragment { id: "results".to_string() });
        assert_eq!(classify("#"), Target::Fragment { id: String::new() });
        assert_eq!(classify("?tab=2#notes"), Target::Fragment { id: "notes".to_string() });
    }

    #[test]
    fn local_paths_keep_fragment_and_drop_query() {
        assert_eq!(
            classify("../L02/index.html?v=3#summary"),
            Target::LocalFile {
                fragment: Some("summary".to_string()),
                path: "../L02/index.html".to_string(),
            }
        );
        assert_eq!(
            classify("/assets/chart.png"),
            Target::LocalFile { fragment: None, path: "/assets/chart.png".to_string() }
        );
    }

    #[test]
    fn colon_after_slash_is_not_a_scheme() {
        assert_eq!(classify("notes/10:30.html").kind(), LinkKind::LocalFile);
        assert_eq!(classify("C:/site/index.html").kind(), LinkKind::LocalFile);
    }

    #[test]
    fn odd_targets_are_skipped() {
        assert_eq!(classify("   "), Target::Skip { reason: "empty link" });
        assert_eq!(classify("?page=2"), Target::Skip { reason: "query-only link" });
        assert_eq!(classify("data:image/png;base64,AAAA").kind(), LinkKind::Skip);
        assert_eq!(classify("ftp://files.example.com").kind(), LinkKind::Skip);
    }

    #[test]
    fn classification_is_deterministic() {
        let raw = "chapter.html#intro";
        assert_eq!(classify(raw), classify(raw));
    }
}
