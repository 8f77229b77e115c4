//! Sumi-Mirror: an offline site mirroring engine
//!
//! This crate crawls a website breadth-first, stores every reachable page and
//! asset under a local directory that mirrors the site's path structure, and
//! rewrites intra-site references so the copy can be browsed without a
//! network connection. An images-only mode collects every discovered image
//! into a single flat directory instead.

pub mod config;
pub mod crawler;
pub mod mirror;
pub mod output;
pub mod state;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Sumi-Mirror operations
///
/// Only setup-time failures surface through this type. Per-URL problems
/// (fetch, parse and write failures) are recorded in the run statistics
/// and never end a crawl.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Start URL {url} is unreachable: {reason}")]
    UnreachableStart { url: String, reason: String },

    #[error("Output directory {} is not writable: {source}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Missing required key: {0}")]
    MissingKey(&'static str),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Sumi-Mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, MirrorMode};
pub use crawler::{mirror, start, RunHandle, RunReport, RunStatus};
pub use state::{RunState, UrlStatus};
pub use url::{normalize_url, Scope, UrlClass};
