//! Reference rewriting inside HTML and CSS text
//!
//! Rewriting works on the original text with targeted patterns instead of
//! re-serializing a parsed tree, so everything except the reference values
//! stays byte-for-byte as served. What each value becomes is decided by a
//! caller-supplied resolver.

use crate::crawler::extractor::{CSS_IMPORT, CSS_URL};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Reference-bearing attributes, longest names first
static HTML_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(\s(?:href|srcset|src|poster|data-srcset|data-src|data)\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#,
    )
    .expect("attribute pattern is valid")
});

static STYLE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\sstyle\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).expect("style attribute pattern is valid")
});

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)(<style\b[^>]*>)(.*?)(</style\s*>)"#).expect("style block pattern is valid")
});

/// `<base href>` would redirect the rewritten relative links back to the site
static BASE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<base\b[^>]*>"#).expect("base tag pattern is valid"));

/// What a reference should point to in the mirrored copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Leave the value untouched
    Keep,
    /// A written local file, as a relative link
    Local(String),
    /// An in-scope URL without a local file yet; written as this absolute URL
    Pending(String),
    /// An out-of-scope URL; written as this absolute URL
    Remote(String),
}

/// The result of rewriting one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub text: String,
    /// Number of references left as `Pending`
    pub unresolved: usize,
}

struct Pass<'r, F> {
    resolve: &'r mut F,
    unresolved: usize,
}

impl<'r, F> Pass<'r, F>
where
    F: FnMut(&str) -> LinkTarget,
{
    fn value(&mut self, raw: &str) -> Option<String> {
        match (self.resolve)(raw) {
            LinkTarget::Keep => None,
            LinkTarget::Local(link) => Some(link),
            LinkTarget::Pending(url) => {
                self.unresolved += 1;
                Some(url)
            }
            LinkTarget::Remote(url) => Some(url),
        }
    }

    fn srcset(&mut self, value: &str) -> Option<String> {
        let mut changed = false;
        let candidates: Vec<String> = value
            .split(',')
            .map(|candidate| {
                let trimmed = candidate.trim();
                let (url, descriptor) = match trimmed.split_once(char::is_whitespace) {
                    Some((url, rest)) => (url, rest.trim()),
                    None => (trimmed, ""),
                };
                match self.value(url) {
                    Some(new_url) => {
                        changed = true;
                        if descriptor.is_empty() {
                            new_url
                        } else {
                            format!("{} {}", new_url, descriptor)
                        }
                    }
                    None => trimmed.to_string(),
                }
            })
            .collect();
        changed.then(|| candidates.join(", "))
    }

    fn css(&mut self, css: &str) -> String {
        let rewritten = CSS_URL.replace_all(css, |caps: &Captures<'_>| {
            let (quote, raw) = quoted_group(caps, 1);
            match self.value(raw) {
                Some(new) => format!("url({q}{}{q})", new, q = quote),
                None => caps[0].to_string(),
            }
        });
        CSS_IMPORT
            .replace_all(&rewritten, |caps: &Captures<'_>| {
                let (quote, raw) = quoted_group(caps, 1);
                match self.value(raw) {
                    Some(new) => format!("@import {q}{}{q}", new, q = quote),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn html(&mut self, html: &str) -> String {
        let without_base = BASE_TAG.replace_all(html, "");

        let styled = STYLE_BLOCK.replace_all(&without_base, |caps: &Captures<'_>| {
            format!("{}{}{}", &caps[1], self.css(&caps[2]), &caps[3])
        });

        let styled = STYLE_ATTR.replace_all(&styled, |caps: &Captures<'_>| {
            let (quote, raw) = quoted_group(caps, 2);
            let decoded = decode_entities(raw);
            let css = self.css(&decoded);
            if css == decoded {
                return caps[0].to_string();
            }
            format!("{}{q}{}{q}", &caps[1], escape_attr(&css, quote), q = quote)
        });

        HTML_ATTR
            .replace_all(&styled, |caps: &Captures<'_>| {
                let prefix = &caps[1];
                let (quote, raw) = quoted_group(caps, 2);
                let decoded = decode_entities(raw);
                let is_srcset = prefix.to_ascii_lowercase().contains("srcset");
                let new = if is_srcset {
                    self.srcset(&decoded)
                } else {
                    self.value(&decoded)
                };
                match new {
                    Some(new) => {
                        let quote = if quote.is_empty() { "\"" } else { quote };
                        format!("{}{q}{}{q}", prefix, escape_attr(&new, quote), q = quote)
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// The quote character and the value of the first matching alternative
///
/// Starting at group `first`, the patterns list the double-quoted,
/// single-quoted and (where allowed) bare alternatives in that order.
fn quoted_group<'t>(caps: &Captures<'t>, first: usize) -> (&'static str, &'t str) {
    for (i, quote) in ["\"", "'", ""].iter().enumerate() {
        if let Some(m) = caps.get(first + i) {
            return (*quote, m.as_str());
        }
    }
    ("", "")
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

fn escape_attr(value: &str, quote: &str) -> String {
    let escaped = value.replace('&', "&amp;");
    match quote {
        "'" => escaped.replace('\'', "&#39;"),
        _ => escaped.replace('"', "&quot;"),
    }
}

/// Rewrites every reference-bearing attribute, inline style and `<style>` block of an HTML document
///
/// Any `<base>` tag is removed, since the rewritten links are relative to
/// the local file.
pub fn rewrite_html<F>(html: &str, mut resolve: F) -> Rewritten
where
    F: FnMut(&str) -> LinkTarget,
{
    let mut pass = Pass {
        resolve: &mut resolve,
        unresolved: 0,
    };
    let text = pass.html(html);
    Rewritten {
        text,
        unresolved: pass.unresolved,
    }
}

/// Rewrites every `url(...)` and `@import` of a stylesheet
pub fn rewrite_css<F>(css: &str, mut resolve: F) -> Rewritten
where
    F: FnMut(&str) -> LinkTarget,
{
    let mut pass = Pass {
        resolve: &mut resolve,
        unresolved: 0,
    };
    let text = pass.css(css);
    Rewritten {
        text,
        unresolved: pass.unresolved,
    }
}
