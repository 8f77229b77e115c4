use crate::config::types::Config;
use crate::ConfigError;
use std::time::Duration;
use url::Url;

/// Worker count above which validation warns
const MANY_WORKERS: usize = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_start_url(&config.start_url)?;
    validate_limits(config)?;
    validate_user_agent(&config.user_agent)?;
    validate_output_dir(config)?;
    for alias in &config.domain_aliases {
        validate_domain_pattern(alias)?;
    }
    Ok(())
}

/// Validates the seed URL: absolute, http(s), with a host
fn validate_start_url(start_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(start_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start_url '{}': {}", start_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "start_url '{}' must use http or https",
            start_url
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "start_url '{}' has no host",
            start_url
        )));
    }

    Ok(())
}

/// Validates numeric limits
fn validate_limits(config: &Config) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_workers < 1 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be >= 1, got {}",
            config.max_workers
        )));
    }
    if config.max_workers > MANY_WORKERS {
        tracing::warn!(
            "max_workers = {} is unusually high; the site may throttle or block the crawl",
            config.max_workers
        );
    }

    if config.timeout < Duration::from_secs(1) {
        return Err(ConfigError::Validation(format!(
            "timeout must be >= 1s, got {:?}",
            config.timeout
        )));
    }

    Ok(())
}

fn validate_user_agent(user_agent: &str) -> Result<(), ConfigError> {
    if user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_dir(config: &Config) -> Result<(), ConfigError> {
    if config.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output_dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // Must contain at least one dot (e.g., example.com, not just "example")
    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("sub.example.com").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern("example").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example.com.").is_err());
    }

    #[test]
    fn test_start_url_rules() {
        assert!(validate_start_url("https://example.com/").is_ok());
        assert!(validate_start_url("http://127.0.0.1:8080/").is_ok());

        assert!(validate_start_url("example.com").is_err());
        assert!(validate_start_url("ftp://example.com/").is_err());
        assert!(validate_start_url("").is_err());
    }

    #[test]
    fn test_limits() {
        let mut config = Config::new("https://example.com/");
        assert!(validate(&config).is_ok());

        config.max_pages = 0;
        assert!(validate(&config).is_err());

        config.max_pages = 1;
        config.max_workers = 0;
        assert!(validate(&config).is_err());

        config.max_workers = 150;
        assert!(validate(&config).is_ok());

        config.max_workers = 1;
        config.timeout = Duration::from_millis(10);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_alias_rejected() {
        let mut config = Config::new("https://example.com/");
        config.domain_aliases = vec!["not a domain".to_string()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
