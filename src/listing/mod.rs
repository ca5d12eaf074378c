//! Directory listing parsing.
//!
//! Only `(href, text)` pairs of anchors are consumed; table layout, icons and
//! sort controls are ignored. Deciding which anchors are real entries is the
//! walker's job.

use std::sync::LazyLock;

use regex::Regex;

/// One anchor from a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    /// Raw `href` attribute value, entity-decoded.
    pub href: String,
    /// Visible text with inner tags stripped, entity-decoded and trimmed.
    pub text: String,
}

impl Anchor {
    /// Creates an anchor.
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }
}

/// Extracts anchors from a listing page, in document order.
pub trait ListingParser: Send + Sync {
    /// Parses `html` into anchors.
    fn parse(&self, html: &str) -> Vec<Anchor>;
}

fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r#"(?is)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))[^>]*>(.*?)</a\s*>"#,
    )
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(?s)<[^>]*>"));

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);"));

/// Regex-based parser for the auto-index pages common HTTP servers generate.
///
/// # Example
///
/// ```
/// use mirror_core::listing::{HtmlAnchorParser, ListingParser};
///
/// let anchors = HtmlAnchorParser.parse(r#"<a href="a%20b.txt">a b.txt</a>"#);
/// assert_eq!(anchors[0].href, "a%20b.txt");
/// assert_eq!(anchors[0].text, "a b.txt");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlAnchorParser;

impl ListingParser for HtmlAnchorParser {
    fn parse(&self, html: &str) -> Vec<Anchor> {
        ANCHOR_RE
            .captures_iter(html)
            .filter_map(|caps| {
                let href = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))?
                    .as_str();
                let inner = caps.get(4).map_or("", |m| m.as_str());
                let text = TAG_RE.replace_all(inner, "");
                Some(Anchor::new(
                    decode_entities(href.trim()),
                    decode_entities(text.trim()),
                ))
            })
            .collect()
    }
}

/// Decodes the named entities auto-index pages emit plus numeric references.
/// Unknown entities are left as written.
fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    ENTITY_RE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let decoded = match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ if body.starts_with("#x") || body.starts_with("#X") => {
                    u32::from_str_radix(&body[2..], 16).ok().and_then(char::from_u32)
                }
                _ if body.starts_with('#') => body[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .trim()
        .to_string()
}
