/// Checks if a host matches a domain alias pattern
///
/// Two kinds of pattern are supported:
/// 1. Exact: `"static.example.net"` matches only that host
/// 2. Wildcard: `"*.example.com"` matches `example.com` itself and any
///    subdomain of it, at any depth
///
/// Both sides are expected to be lowercase already.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::matches_wildcard;
///
/// assert!(matches_wildcard("cdn.example.com", "cdn.example.com"));
/// assert!(!matches_wildcard("cdn.example.com", "img.cdn.example.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "img.cdn.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .map_or(false, |prefix| prefix.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Returns true if `host` matches any of the alias patterns
pub fn matches_any(patterns: &[String], host: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| matches_wildcard(pattern, host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
        assert!(!matches_wildcard("blog.example.com", "example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_wildcard("*.wixstatic.com", "wixstatic.com"));
        assert!(matches_wildcard("*.wixstatic.com", "static.wixstatic.com"));
        assert!(matches_wildcard("*.wixstatic.com", "a.b.wixstatic.com"));
    }

    #[test]
    fn test_wildcard_no_match_partial() {
        assert!(!matches_wildcard("*.example.com", "myexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
        assert!(!matches_wildcard("*.example.com", ""));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec!["cdn.example.net".to_string(), "*.parastorage.com".to_string()];
        assert!(matches_any(&patterns, "cdn.example.net"));
        assert!(matches_any(&patterns, "static.parastorage.com"));
        assert!(!matches_any(&patterns, "example.net"));
        assert!(!matches_any(&[], "example.net"));
    }
}
