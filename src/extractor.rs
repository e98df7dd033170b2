//! Link extraction: which tags carry checkable references, and from which attribute.

use crate::html::{Tag, TagScanner};

/// A reference as written in the document, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    /// Attribute the target came from: `href` or `src`.
    pub attribute: &'static str,
    /// One-based line of the carrying tag.
    pub line: u32,
    /// Lowercased name of the carrying tag.
    pub tag: String,
    /// Attribute value with surrounding whitespace trimmed.
    pub target: String,
}

/// Lazily extract references from one HTML document, in document order.
///
/// `<a>` and `<link>` contribute `href`; `<img>` and `<script>` contribute
/// `src`. Tags without the attribute (inline scripts, named anchors) are
/// ignored. Never fails: malformed markup is skipped by the scanner.
pub fn extract_links(content: &str) -> impl Iterator<Item = RawLink> + '_ {
    return TagScanner::new(content).filter_map(link_from_tag);
}

/// The attribute that carries a reference for a given tag, if any.
fn link_attribute(tag: &str) -> Option<&'static str> {
    return match tag {
        "a" | "link" => Some("href"),
        "img" | "script" => Some("src"),
        _ => None,
    };
}

fn link_from_tag(tag: Tag) -> Option<RawLink> {
    let attribute = link_attribute(&tag.name)?;
    let target = tag.attribute(attribute)?.trim().to_string();
    return Some(RawLink { attribute, line: tag.line, tag: tag.name, target });
}
