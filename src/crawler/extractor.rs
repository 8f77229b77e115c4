//! Reference extraction from fetched pages and stylesheets
//!
//! This module handles parsing fetched content to enumerate:
//! - Navigation links (anchors, frames, canonical/next/prev links)
//! - Resource references (images, scripts, stylesheets, media, fonts)
//! - `url(...)` and `@import` references inside CSS, inline styles and `<style>` blocks
//! - Loose image URLs in raw markup (used by the images-only mode)
//!
//! Extraction never fails. Malformed markup yields whatever the tolerant
//! parser recovered, flagged as `degraded`.

use crate::url::LinkHint;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// `url(...)` in CSS; the three groups are the double-quoted, single-quoted and bare forms
pub(crate) static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]+))\s*\)"#)
        .expect("CSS url() pattern is valid")
});

/// `@import "..."` in CSS (the `@import url(...)` form is covered by `CSS_URL`)
pub(crate) static CSS_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).expect("CSS @import pattern is valid")
});

static ABSOLUTE_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)https?://[^\s<>"']+\.(?:jpg|jpeg|png|gif|webp|svg|ico|bmp|tiff|jfif|avif)(?:\?[^\s<>"']*)?"#,
    )
    .expect("absolute image pattern is valid")
});

static QUOTED_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)["']([^"'\s<>]+\.(?:jpg|jpeg|png|gif|webp|svg|ico|bmp|tiff|jfif|avif)(?:\?[^"'\s<>]*)?)["']"#)
        .expect("quoted image pattern is valid")
});

/// Schemes that never name a fetchable resource
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "about:", "blob:"];

/// A reference found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The value as written in the document
    pub raw: String,

    /// The value resolved against the document base
    pub url: Url,

    /// Where the reference was found
    pub hint: LinkHint,
}

/// Everything extracted from one document
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Base used for resolution (the document URL, or its `<base href>`)
    pub base: Url,

    /// Unique references in document order
    pub references: Vec<Reference>,

    /// True if the parser had to recover from errors or the body was not UTF-8
    pub degraded: bool,
}

/// One attribute slot that carries a reference
struct Slot {
    selector: &'static str,
    attr: &'static str,
    hint: LinkHint,
    srcset: bool,
}

const fn slot(selector: &'static str, attr: &'static str, hint: LinkHint) -> Slot {
    Slot {
        selector,
        attr,
        hint,
        srcset: false,
    }
}

const fn srcset(selector: &'static str, attr: &'static str) -> Slot {
    Slot {
        selector,
        attr,
        hint: LinkHint::Image,
        srcset: true,
    }
}

const SLOTS: &[Slot] = &[
    slot("area[href]", "href", LinkHint::Navigation),
    slot("iframe[src]", "src", LinkHint::Navigation),
    slot("frame[src]", "src", LinkHint::Navigation),
    slot("img[src]", "src", LinkHint::Image),
    srcset("img[srcset]", "srcset"),
    slot("img[data-src]", "data-src", LinkHint::Image),
    srcset("img[data-srcset]", "data-srcset"),
    slot("source[src]", "src", LinkHint::Resource),
    srcset("source[srcset]", "srcset"),
    slot("script[src]", "src", LinkHint::Resource),
    slot("video[src]", "src", LinkHint::Resource),
    slot("video[poster]", "poster", LinkHint::Image),
    slot("audio[src]", "src", LinkHint::Resource),
    slot("track[src]", "src", LinkHint::Resource),
    slot("embed[src]", "src", LinkHint::Resource),
    slot("object[data]", "data", LinkHint::Resource),
    slot("input[type='image'][src]", "src", LinkHint::Image),
];

/// Collects references while dropping duplicates and unusable values
struct Collector {
    base: Url,
    seen: HashSet<String>,
    references: Vec<Reference>,
}

impl Collector {
    fn new(base: Url) -> Self {
        Self {
            base,
            seen: HashSet::new(),
            references: Vec::new(),
        }
    }

    fn push(&mut self, raw: &str, hint: LinkHint) {
        let Some(url) = resolve_reference(raw, &self.base) else {
            return;
        };
        if self.seen.insert(url.as_str().to_string()) {
            self.references.push(Reference {
                raw: raw.trim().to_string(),
                url,
                hint,
            });
        }
    }

    fn push_srcset(&mut self, value: &str, hint: LinkHint) {
        for candidate in split_srcset(value) {
            self.push(candidate, hint);
        }
    }

    fn push_css(&mut self, css: &str) {
        for raw in css_references(css) {
            self.push(&raw, LinkHint::Resource);
        }
    }

    fn finish(self, degraded: bool) -> Extraction {
        Extraction {
            base: self.base,
            references: self.references,
            degraded,
        }
    }
}

/// Parses an HTML page and collects every reference it carries
///
/// # Reference Sources
///
/// **Navigation:**
/// - `<a href>` (except `download` links), `<area href>`
/// - `<iframe src>`, `<frame src>`
/// - `<link rel="canonical|next|prev">`
///
/// **Image:**
/// - `<img src|srcset|data-src|data-srcset>`, `<source srcset>`, `<video poster>`
/// - `<input type="image" src>`, `<link rel="icon|apple-touch-icon|mask-icon">`
///
/// **Resource:**
/// - `<source src>`, `<script src>`, `<video src>`, `<audio src>`, `<track src>`
/// - `<embed src>`, `<object data>`, `<a download>`
/// - `<link rel="stylesheet|preload|modulepreload|prefetch|manifest">`
/// - `url(...)`/`@import` in `style` attributes and `<style>` blocks
///
/// **Skipped:** empty values, fragment-only links, and `javascript:`,
/// `mailto:`, `tel:`, `data:`, `about:`, `blob:` values.
///
/// # Arguments
///
/// * `body` - The raw page bytes (decoded lossily if not UTF-8)
/// * `page_url` - The URL the page was served from, after redirects
pub fn extract_html(body: &[u8], page_url: &Url) -> Extraction {
    let not_utf8 = std::str::from_utf8(body).is_err();
    let text = String::from_utf8_lossy(body);
    let document = Html::parse_document(&text);

    let base = document_base(&document, page_url);
    let mut collector = Collector::new(base);

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let hint = if element.value().attr("download").is_some() {
                LinkHint::Resource
            } else {
                LinkHint::Navigation
            };
            if let Some(href) = element.value().attr("href") {
                collector.push(href, hint);
            }
        }
    }

    if let Ok(selector) = Selector::parse("link[href]") {
        for element in document.select(&selector) {
            let Some(hint) = link_hint(element) else {
                continue;
            };
            if let Some(href) = element.value().attr("href") {
                collector.push(href, hint);
            }
        }
    }

    for slot in SLOTS {
        let Ok(selector) = Selector::parse(slot.selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(value) = element.value().attr(slot.attr) else {
                continue;
            };
            if slot.srcset {
                collector.push_srcset(value, slot.hint);
            } else {
                collector.push(value, slot.hint);
            }
        }
    }

    if let Ok(selector) = Selector::parse("[style]") {
        for element in document.select(&selector) {
            if let Some(style) = element.value().attr("style") {
                collector.push_css(style);
            }
        }
    }

    if let Ok(selector) = Selector::parse("style") {
        for element in document.select(&selector) {
            collector.push_css(&element.text().collect::<String>());
        }
    }

    collector.finish(not_utf8 || !document.errors.is_empty())
}

/// Collects `url(...)` and `@import` references from a stylesheet
pub fn extract_css(body: &[u8], css_url: &Url) -> Extraction {
    let not_utf8 = std::str::from_utf8(body).is_err();
    let text = String::from_utf8_lossy(body);

    let mut collector = Collector::new(css_url.clone());
    collector.push_css(&text);
    collector.finish(not_utf8)
}

/// Finds image URLs anywhere in raw markup, including inline scripts and JSON
///
/// Matches absolute `http(s)://...` URLs and quoted values ending in an image
/// extension. Every match is reported with the image hint.
pub fn scan_image_urls(body: &[u8], page_url: &Url) -> Vec<Reference> {
    let text = String::from_utf8_lossy(body);
    let mut collector = Collector::new(page_url.clone());

    for found in ABSOLUTE_IMAGE.find_iter(&text) {
        collector.push(found.as_str(), LinkHint::Image);
    }
    for captures in QUOTED_IMAGE.captures_iter(&text) {
        if let Some(found) = captures.get(1) {
            collector.push(found.as_str(), LinkHint::Image);
        }
    }

    collector.references
}

/// Returns the raw values of every `url(...)` and `@import` in CSS text
pub fn css_references(css: &str) -> Vec<String> {
    let mut values = Vec::new();
    for captures in CSS_URL.captures_iter(css) {
        if let Some(value) = first_group(&captures) {
            values.push(value.to_string());
        }
    }
    for captures in CSS_IMPORT.captures_iter(css) {
        if let Some(value) = first_group(&captures) {
            values.push(value.to_string());
        }
    }
    values
}

/// Splits a `srcset` value into its candidate URLs
pub fn split_srcset(value: &str) -> Vec<&str> {
    value
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .collect()
}

/// Resolves a raw reference against `base`
///
/// Returns None if the reference should be excluded:
/// - Empty values and fragment-only links
/// - javascript:, mailto:, tel:, data:, about:, blob: values
/// - Values that do not resolve to an http(s) URL
pub fn resolve_reference(raw: &str, base: &Url) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    if SKIPPED_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return None;
    }

    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

fn first_group<'t>(captures: &regex::Captures<'t>) -> Option<&'t str> {
    (1..captures.len())
        .find_map(|i| captures.get(i))
        .map(|m| m.as_str())
}

/// The base for relative references: `<base href>` if present and valid
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or_else(|| page_url.clone())
}

/// Decides how a `<link>` is followed from its `rel` tokens
fn link_hint(element: ElementRef<'_>) -> Option<LinkHint> {
    let rel = element.value().attr("rel")?.to_ascii_lowercase();
    let mut hint = None;
    for token in rel.split_whitespace() {
        match token {
            "icon" | "apple-touch-icon" | "mask-icon" => return Some(LinkHint::Image),
            "stylesheet" | "preload" | "modulepreload" | "prefetch" | "manifest" => {
                return Some(LinkHint::Resource)
            }
            "canonical" | "next" | "prev" => hint = Some(LinkHint::Navigation),
            _ => {}
        }
    }
    hint
}
