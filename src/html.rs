//! Forgiving start-tag scanner for generated HTML.
//!
//! One pass over the text yields every start tag with its attributes and the
//! line it began on. Malformed markup never aborts the scan: a tag that is
//! unterminated or interrupted by another `<` is discarded and scanning
//! resumes at the next `<`. Comments, doctypes, end tags, and the raw text
//! of `<script>`/`<style>` elements are skipped.

use std::sync::LazyLock;

use regex::Regex;

/// `name`, `name=value`, `name="value"`, `name='value'`.
#[allow(clippy::expect_used, reason = "pattern is a compile-time constant")]
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("valid regex");
});

/// A start tag. Tag and attribute names are ASCII-lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Attribute `(name, value)` pairs in source order, entities decoded.
    pub attributes: Vec<(String, String)>,
    /// One-based line of the opening `<`.
    pub line: u32,
    /// Lowercased tag name.
    pub name: String,
}

impl Tag {
    /// First value of the named attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        return self
            .attributes
            .iter()
            .find(|(key, _)| return key == name)
            .map(|(_, value)| return value.as_str());
    }
}

/// Lazy iterator over the start tags of one document. Cheap to construct;
/// scanning the same text twice yields the same tags.
pub struct TagScanner<'a> {
    line: u32,
    pos: usize,
    source: &'a str,
}

impl<'a> TagScanner<'a> {
    /// Scan `source` from the beginning.
    pub const fn new(source: &'a str) -> Self {
        return Self { line: 1, pos: 0, source };
    }

    /// Move forward `len` bytes, counting the newlines passed over.
    fn advance(&mut self, len: usize) {
        let end = self.pos.saturating_add(len).min(self.source.len());
        let skipped = self.source.get(self.pos..end).unwrap_or("");
        let newlines = u32::try_from(skipped.matches('\n').count()).unwrap_or(u32::MAX);
        self.line = self.line.saturating_add(newlines);
        self.pos = end;
    }

    /// Unscanned remainder of the source.
    fn rest(&self) -> &'a str {
        return self.source.get(self.pos..).unwrap_or("");
    }

    /// Skip the raw text of a `<script>` or `<style>` element up to its end tag.
    fn skip_raw_text(&mut self, name: &str) {
        let rest = self.rest();
        let len = rest
            .match_indices("</")
            .map(|(at, _)| return at)
            .find(|&at| {
                let candidate = rest.as_bytes().get(at.saturating_add(2)..).unwrap_or_default();
                return candidate
                    .get(..name.len())
                    .is_some_and(|tag| return tag.eq_ignore_ascii_case(name.as_bytes()));
            })
            .unwrap_or(rest.len());
        self.advance(len);
    }

    /// Skip past the next occurrence of `terminator`, or to the end.
    fn skip_past(&mut self, terminator: &str) {
        let rest = self.rest();
        let len = rest
            .find(terminator)
            .map_or(rest.len(), |at| return at.saturating_add(terminator.len()));
        self.advance(len);
    }
}

impl Iterator for TagScanner<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        loop {
            let open = self.rest().find('<')?;
            self.advance(open);
            let rest = self.rest();

            if rest.starts_with("<!--") {
                self.skip_past("-->");
                continue;
            }
            if rest.starts_with("<!") || rest.starts_with("<?") || rest.starts_with("</") {
                self.skip_past(">");
                continue;
            }

            let after_open = rest.get(1..).unwrap_or("");
            if !after_open.starts_with(|c: char| return c.is_ascii_alphabetic()) {
                // Stray `<` in text, e.g. `a < b`.
                self.advance(1);
                continue;
            }
            let name_len = after_open
                .find(|c: char| return !(c.is_ascii_alphanumeric() || c == '-' || c == ':'))
                .unwrap_or(after_open.len());
            let name = after_open.get(..name_len).unwrap_or("").to_ascii_lowercase();
            let tail = after_open.get(name_len..).unwrap_or("");

            let Some(close) = find_tag_end(tail) else {
                tracing::trace!(line = self.line, tag = %name, "discarding malformed tag");
                self.advance(1);
                continue;
            };

            let line = self.line;
            let attributes = parse_attributes(tail.get(..close).unwrap_or(""));
            self.advance(name_len.saturating_add(close).saturating_add(2));
            if name == "script" || name == "style" {
                self.skip_raw_text(&name);
            }
            return Some(Tag { attributes, line, name });
        }
    }
}

/// Replace the handful of entities that show up in generated URLs.
fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    return value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
}

/// Byte offset of the `>` closing a tag, honoring quoted attribute values.
/// `None` when another `<` interrupts the tag or the text ends first.
fn find_tag_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut after_equals = false;

    for (index, ch) in text.char_indices() {
        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
            },
            None => match ch {
                '>' => return Some(index),
                '<' => return None,
                '"' | '\'' if after_equals => quote = Some(ch),
                _ => {},
            },
        }
        if !ch.is_whitespace() {
            after_equals = ch == '=';
        }
    }

    return None;
}

/// Split the inside of a start tag into attribute pairs.
fn parse_attributes(body: &str) -> Vec<(String, String)> {
    return ATTRIBUTE
        .captures_iter(body)
        .filter_map(|cap| {
            let name = cap.get(1)?.as_str().to_ascii_lowercase();
            let value = cap
                .get(2)
                .or_else(|| return cap.get(3))
                .or_else(|| return cap.get(4))
                .map_or("", |m| return m.as_str());
            return Some((name, decode_entities(value)));
        })
        .collect();
}
