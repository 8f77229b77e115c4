//! URL handling module for Sumi-Mirror
//!
//! This module provides URL normalization, host extraction, alias matching,
//! asset-kind inference and scope classification.

mod domain;
mod kind;
mod matcher;
mod normalize;

use crate::config::Config;
use crate::{UrlError, UrlResult};
use serde::Serialize;
use std::fmt;
use url::Url;

pub use domain::{extract_domain, site_dir_name};
pub use kind::{
    is_html_mime, is_image_url, parse_content_type, path_extension, AssetKind, IMAGE_EXTENSIONS,
};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{canonicalize, normalize_url, resolve_url};

/// Classification of a discovered URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlClass {
    /// An in-scope document that is traversed for further links
    Page,
    /// An in-scope resource referenced by a page (image, stylesheet, script, font)
    Asset,
    /// Out of scope; never enqueued
    External,
    /// Not fetchable (mailto:, javascript:, data: and other schemes)
    Invalid,
}

impl UrlClass {
    /// Returns true if URLs of this class may enter the frontier
    pub fn is_fetchable(&self) -> bool {
        matches!(self, Self::Page | Self::Asset)
    }
}

impl fmt::Display for UrlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Page => "page",
            Self::Asset => "asset",
            Self::External => "external",
            Self::Invalid => "invalid",
        };
        write!(f, "{}", name)
    }
}

/// How a reference was found, used to break ties when the path says nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkHint {
    /// Anchors, iframes, canonical links: followed as pages unless the path says otherwise
    Navigation,
    /// Script, stylesheet, media and download sources: always assets
    Resource,
    /// Image slots (`img`, `srcset`, posters, icons): assets that images-only runs keep
    Image,
}

/// A canonical URL together with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub url: Url,
    pub class: UrlClass,
}

/// The traversal scope of one crawl run
///
/// A scope is built once from the configuration and then shared read-only by
/// every worker. Classification is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct Scope {
    start_host: String,
    aliases: Vec<String>,
    same_domain_only: bool,
}

impl Scope {
    /// Creates a scope rooted at `start` (which must already be canonical)
    pub fn new(start: &Url, aliases: Vec<String>, same_domain_only: bool) -> UrlResult<Self> {
        let start_host = extract_domain(start).ok_or(UrlError::MissingHost)?;
        Ok(Self {
            start_host,
            aliases,
            same_domain_only,
        })
    }

    /// Builds the scope described by a configuration
    pub fn from_config(config: &Config) -> UrlResult<Self> {
        let start = normalize_url(&config.start_url)?;
        Self::new(
            &start,
            config.domain_aliases.clone(),
            config.same_domain_only,
        )
    }

    /// The start URL's host
    pub fn start_host(&self) -> &str {
        &self.start_host
    }

    /// Returns true if `host` is the start host or one of its aliases
    pub fn is_same_site(&self, host: &str) -> bool {
        host == self.start_host || matches_any(&self.aliases, host)
    }

    /// Returns true if URLs on `url`'s host may be crawled
    pub fn in_scope(&self, url: &Url) -> bool {
        if !self.same_domain_only {
            return true;
        }
        url.host_str()
            .map_or(false, |host| self.is_same_site(&host.to_ascii_lowercase()))
    }

    /// Resolves a raw reference against its document and classifies it
    ///
    /// # Classification Rules
    ///
    /// | Condition | Class |
    /// |-----------|-------|
    /// | Scheme other than http/https | Invalid |
    /// | Host outside the start host and aliases (when `same_domain_only`) | External |
    /// | Asset extension, or found in a resource slot | Asset |
    /// | Anything else | Page |
    ///
    /// # Returns
    ///
    /// * `Ok(Classified)` - The canonical URL and its class
    /// * `Err(UrlError)` - The reference could not be parsed; callers drop it
    pub fn classify(&self, raw: &str, base: &Url, hint: LinkHint) -> UrlResult<Classified> {
        let url = match resolve_url(raw, base) {
            Ok(url) => url,
            Err(UrlError::InvalidScheme(_)) => {
                let url = base
                    .join(raw.trim())
                    .map_err(|e| UrlError::Parse(e.to_string()))?;
                return Ok(Classified {
                    url,
                    class: UrlClass::Invalid,
                });
            }
            Err(e) => return Err(e),
        };

        let class = self.class_of(&url, hint);
        Ok(Classified { url, class })
    }

    /// Classifies an already-canonical URL
    pub fn class_of(&self, url: &Url, hint: LinkHint) -> UrlClass {
        if url.scheme() != "http" && url.scheme() != "https" {
            return UrlClass::Invalid;
        }
        if !self.in_scope(url) {
            return UrlClass::External;
        }
        if hint != LinkHint::Navigation || AssetKind::from_url(url).is_some() {
            UrlClass::Asset
        } else {
            UrlClass::Page
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(same_domain_only: bool) -> Scope {
        let start = Url::parse("https://example.com/").unwrap();
        Scope::new(&start, vec!["*.examplecdn.net".to_string()], same_domain_only).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://example.com/blog/post").unwrap()
    }

    #[test]
    fn test_same_host_page() {
        let c = scope(true).classify("/about/", &base(), LinkHint::Navigation).unwrap();
        assert_eq!(c.url.as_str(), "https://example.com/about");
        assert_eq!(c.class, UrlClass::Page);
    }

    #[test]
    fn test_asset_by_extension() {
        let c = scope(true).classify("../img/a.png", &base(), LinkHint::Navigation).unwrap();
        assert_eq!(c.url.as_str(), "https://example.com/img/a.png");
        assert_eq!(c.class, UrlClass::Asset);
    }

    #[test]
    fn test_asset_by_hint() {
        let c = scope(true)
            .classify("/render?id=4", &base(), LinkHint::Resource)
            .unwrap();
        assert_eq!(c.class, UrlClass::Asset);
    }

    #[test]
    fn test_image_hint_is_asset() {
        let c = scope(true)
            .classify("/thumb?id=7", &base(), LinkHint::Image)
            .unwrap();
        assert_eq!(c.class, UrlClass::Asset);
    }

    #[test]
    fn test_external_when_same_domain_only() {
        let c = scope(true)
            .classify("https://other.org/x.png", &base(), LinkHint::Resource)
            .unwrap();
        assert_eq!(c.class, UrlClass::External);
    }

    #[test]
    fn test_external_allowed_when_unscoped() {
        let c = scope(false)
            .classify("https://other.org/x.png", &base(), LinkHint::Resource)
            .unwrap();
        assert_eq!(c.class, UrlClass::Asset);
    }

    #[test]
    fn test_subdomain_is_external_without_alias() {
        let c = scope(true)
            .classify("https://blog.example.com/", &base(), LinkHint::Navigation)
            .unwrap();
        assert_eq!(c.class, UrlClass::External);
    }

    #[test]
    fn test_alias_in_scope() {
        let c = scope(true)
            .classify("https://static.examplecdn.net/a.css", &base(), LinkHint::Resource)
            .unwrap();
        assert_eq!(c.class, UrlClass::Asset);
    }

    #[test]
    fn test_invalid_schemes() {
        for raw in ["mailto:a@example.com", "javascript:void(0)", "tel:+100", "data:text/plain,hi"] {
            let c = scope(true).classify(raw, &base(), LinkHint::Navigation).unwrap();
            assert_eq!(c.class, UrlClass::Invalid, "{}", raw);
        }
    }

    #[test]
    fn test_malformed_reference() {
        assert!(scope(true)
            .classify("http://[::1", &base(), LinkHint::Navigation)
            .is_err());
    }

    #[test]
    fn test_is_fetchable() {
        assert!(UrlClass::Page.is_fetchable());
        assert!(UrlClass::Asset.is_fetchable());
        assert!(!UrlClass::External.is_fetchable());
        assert!(!UrlClass::Invalid.is_fetchable());
    }
}
