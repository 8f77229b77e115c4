use crate::config::types::{Config, MirrorMode};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the `key = value` configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_mirror::config::load_config;
///
/// let config = load_config(Path::new("config.txt")).unwrap();
/// println!("Max pages: {}", config.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
///
/// Blank lines and lines starting with `#` are skipped. Every other line must
/// be `key = value`; values may be quoted. Unknown keys are ignored with a
/// warning.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let mut start_url = None;
    let mut config = Config::new(String::new());

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
            line: line_no,
            message: format!("expected 'key = value', got '{}'", line),
        })?;
        let key = key.trim();
        let value = unquote(value.trim());
        let err = |message: String| ConfigError::Parse {
            line: line_no,
            message,
        };

        match key {
            "start_url" => start_url = Some(value.to_string()),
            "max_pages" => config.max_pages = parse_number(key, value).map_err(err)?,
            "max_workers" => config.max_workers = parse_number(key, value).map_err(err)?,
            "render_pages" => config.render_pages = parse_number(key, value).map_err(err)?,
            "delay" => config.delay = parse_seconds(key, value).map_err(err)?,
            "timeout" => config.timeout = parse_seconds(key, value).map_err(err)?,
            "same_domain_only" => config.same_domain_only = parse_bool(key, value).map_err(err)?,
            "collect_images" => config.collect_images = parse_bool(key, value).map_err(err)?,
            "mode" => config.mode = value.parse::<MirrorMode>().map_err(err)?,
            "output_dir" => config.output_dir = PathBuf::from(value),
            "user_agent" => config.user_agent = value.to_string(),
            "browser_path" => {
                config.browser_path = (!value.is_empty()).then(|| PathBuf::from(value))
            }
            "domain_aliases" => {
                config.domain_aliases = value
                    .split(',')
                    .map(|alias| alias.trim().to_ascii_lowercase())
                    .filter(|alias| !alias.is_empty())
                    .collect()
            }
            "obey_robots" => {
                tracing::warn!("Line {}: obey_robots is not supported and will be ignored", line_no)
            }
            other => tracing::warn!("Line {}: ignoring unknown key '{}'", line_no, other),
        }
    }

    config.start_url = start_url.ok_or(ConfigError::MissingKey("start_url"))?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is logged at startup so a run can be tied to the exact file it used.
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, String> {
    value
        .parse::<usize>()
        .map_err(|_| format!("{} must be a non-negative integer, got '{}'", key, value))
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, String> {
    let seconds = value
        .parse::<f64>()
        .map_err(|_| format!("{} must be a number of seconds, got '{}'", key, value))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("{} must be a non-negative number, got '{}'", key, value));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("{} is too large, got '{}'", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err(format!("{} must be a boolean, got '{}'", key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
# Site to mirror
start_url = https://example.com/
max_pages = 50
delay = 0.25
max_workers = 8
same_domain_only = no
mode = images
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.start_url, "https://example.com/");
        assert_eq!(config.max_pages, 50);
        assert_eq!(config.delay, Duration::from_millis(250));
        assert_eq!(config.max_workers, 8);
        assert!(!config.same_domain_only);
        assert_eq!(config.mode, MirrorMode::Images);
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse_config("start_url=https://example.com/").unwrap();

        assert_eq!(config.max_pages, 1000);
        assert_eq!(config.delay, Duration::from_millis(500));
        assert_eq!(config.max_workers, 20);
        assert!(config.same_domain_only);
        assert_eq!(config.mode, MirrorMode::Mirror);
        assert_eq!(config.output_dir, PathBuf::from("scraped_site"));
        assert_eq!(config.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_quoted_values_and_aliases() {
        let config = parse_config(
            "start_url = \"https://example.com/\"\ndomain_aliases = *.CDN.example.com, static.example.net\n",
        )
        .unwrap();

        assert_eq!(config.start_url, "https://example.com/");
        assert_eq!(
            config.domain_aliases,
            vec!["*.cdn.example.com".to_string(), "static.example.net".to_string()]
        );
    }

    #[test]
    fn test_missing_start_url() {
        let result = parse_config("max_pages = 10");
        assert!(matches!(result, Err(ConfigError::MissingKey("start_url"))));
    }

    #[test]
    fn test_line_without_equals() {
        let result = parse_config("start_url = https://example.com/\njust some words");
        assert!(matches!(result, Err(ConfigError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_bad_number() {
        let result = parse_config("start_url = https://example.com/\nmax_pages = lots");
        assert!(matches!(result, Err(ConfigError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_negative_delay_rejected() {
        let result = parse_config("start_url = https://example.com/\ndelay = -1");
        assert!(result.is_err());
    }

    #[test]
    fn test_huge_delay_rejected() {
        let result = parse_config("start_url = https://example.com/\ndelay = 1e20");
        match result {
            Err(ConfigError::Parse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("delay"));
            }
            other => panic!("expected a parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config =
            parse_config("start_url = https://example.com/\nobey_robots = true\ncolour = blue")
                .unwrap();
        assert_eq!(config.start_url, "https://example.com/");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.txt"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("start_url = https://example.com/\nmax_workers = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("start_url = https://example.com/");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("start_url = https://a.example.com/");
        let file2 = create_temp_config("start_url = https://b.example.com/");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
