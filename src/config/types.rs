use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "SumiMirror/1.0 (+https://example.com/bot)";

/// What a run produces on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorMode {
    /// Pages and assets under `{output}/{domain}/`, references rewritten
    Mirror,
    /// Images only, flattened into `{output}/{domain}-images/`
    Images,
}

impl FromStr for MirrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirror" | "full" | "site" => Ok(Self::Mirror),
            "images" | "images-only" | "imagesonly" => Ok(Self::Images),
            other => Err(format!("unknown mode '{}' (expected mirror or images)", other)),
        }
    }
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mirror => write!(f, "mirror"),
            Self::Images => write!(f, "images"),
        }
    }
}

/// Main configuration structure for Sumi-Mirror
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Absolute URL the crawl starts from
    pub start_url: String,

    /// Hard ceiling on page-classified admissions to the frontier
    pub max_pages: usize,

    /// Pause each worker takes after every request
    pub delay: Duration,

    /// Number of concurrent fetch workers
    pub max_workers: usize,

    /// Restrict traversal to the start host and its aliases
    pub same_domain_only: bool,

    /// Full mirror or images-only
    pub mode: MirrorMode,

    /// Root directory all output lands under
    pub output_dir: PathBuf,

    /// Per-request timeout
    pub timeout: Duration,

    /// User-Agent header value
    pub user_agent: String,

    /// Extra host patterns treated as part of the site (e.g. `*.cdn.example.com`)
    pub domain_aliases: Vec<String>,

    /// Number of leading pages to render through a headless browser
    pub render_pages: usize,

    /// Explicit headless browser binary; detected on `PATH` when unset
    pub browser_path: Option<PathBuf>,

    /// In mirror mode, also copy images into the flat images directory
    pub collect_images: bool,
}

impl Config {
    /// Creates a configuration for `start_url` with every other key at its default
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            start_url: start_url.into(),
            max_pages: 1000,
            delay: Duration::from_millis(500),
            max_workers: 20,
            same_domain_only: true,
            mode: MirrorMode::Mirror,
            output_dir: PathBuf::from("scraped_site"),
            timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            domain_aliases: Vec::new(),
            render_pages: 0,
            browser_path: None,
            collect_images: false,
        }
    }
}
