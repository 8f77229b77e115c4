use crate::UrlError;
use url::Url;

/// Tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// Normalizes an absolute URL string
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an http or https scheme
/// 3. Lowercase the host (the parser already drops default ports)
/// 4. Normalize the path:
///    - Remove dot segments (. and ..)
///    - Collapse repeated slashes
///    - Remove trailing slash (except for root /)
/// 5. Remove the fragment
/// 6. Remove tracking query parameters, sort the rest
/// 7. Remove an empty query string
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM:80/docs//intro/#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/docs/intro");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Resolves a reference against the document it appeared in, then normalizes it
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::resolve_url;
///
/// let base = Url::parse("https://example.com/blog/post").unwrap();
/// let url = resolve_url("../img/a.png", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/img/a.png");
/// ```
pub fn resolve_url(raw: &str, base: &Url) -> Result<Url, UrlError> {
    let joined = base
        .join(raw.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    canonicalize(joined)
}

/// Brings an already-parsed URL into canonical form
pub fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    // The url crate lowercases hosts of special schemes; this covers IDNA edge cases
    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_lowercase(),
        _ => return Err(UrlError::MissingHost),
    };
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if let Some(query) = url.query() {
        let filtered = filter_and_sort_query(query);
        if filtered.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&filtered));
        }
    }

    Ok(url)
}

/// Collapses repeated slashes, resolves dot segments and drops a trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Drops tracking parameters and sorts the rest, keeping their original encoding
fn filter_and_sort_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            !is_tracking_param(key)
        })
        .collect();

    pairs.sort_unstable();
    pairs.join("&")
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_default_port_removed() {
        let result = normalize_url("https://example.com:443/page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");

        let result = normalize_url("http://example.com:8080/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com:8080/page");
    }

    #[test]
    fn test_remove_trailing_slash() {
        let result = normalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_root_slash() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_tracking_params_removed_and_sorted() {
        let result = normalize_url(
            "https://example.com/page?keep=yes&utm_medium=email&another=value&fbclid=123",
        )
        .unwrap();
        assert_eq!(
            result.as_str(),
            "https://example.com/page?another=value&keep=yes"
        );
    }

    #[test]
    fn test_only_tracking_params_drops_query() {
        let result = normalize_url("https://example.com/page?utm_source=a&gclid=c").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_query_encoding_preserved() {
        let result = normalize_url("https://example.com/search?q=a%20b&page=2").unwrap();
        assert_eq!(result.as_str(), "https://example.com/search?page=2&q=a%20b");
    }

    #[test]
    fn test_dots_and_slashes() {
        let result = normalize_url("https://example.com///a/../b/./c//").unwrap();
        assert_eq!(result.as_str(), "https://example.com/b/c");
    }

    #[test]
    fn test_lowercase_host_only() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_resolve_relative() {
        let base = Url::parse("https://example.com/docs/guide/").unwrap();
        assert_eq!(
            resolve_url("intro", &base).unwrap().as_str(),
            "https://example.com/docs/guide/intro"
        );
        assert_eq!(
            resolve_url("//cdn.example.com/x.css", &base).unwrap().as_str(),
            "https://cdn.example.com/x.css"
        );
        assert_eq!(
            resolve_url("/a/b/#c", &base).unwrap().as_str(),
            "https://example.com/a/b"
        );
    }

    #[test]
    fn test_resolve_rejects_mailto() {
        let base = Url::parse("https://example.com/").unwrap();
        assert!(matches!(
            resolve_url("mailto:someone@example.com", &base),
            Err(UrlError::InvalidScheme(_))
        ));
    }
}
