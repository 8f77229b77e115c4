//! Fetcher implementations
//!
//! This module handles all network retrieval for the crawler, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Plain GET fetching with error classification
//! - Optional headless-browser rendering of the first pages of a run
//!
//! Both fetchers implement the [`Fetcher`] trait. The worker pool is generic
//! over it, and the coordinator picks the implementation once, when the pool
//! is built.

use crate::config::Config;
use crate::url::{is_html_mime, parse_content_type, UrlClass};
use mime::Mime;
use reqwest::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use url::Url;

/// Browser binaries probed on `PATH`, in order
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// A successfully retrieved document
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// The canonical URL that was requested
    pub url: Url,

    /// URL after redirects; relative references resolve against this
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Parsed Content-Type header (`None` when absent or malformed)
    pub content_type: Option<Mime>,

    /// Raw body bytes
    pub body: Vec<u8>,

    /// True when the body is a browser-rendered DOM instead of the raw response
    pub rendered: bool,
}

impl FetchedDocument {
    pub fn is_html(&self) -> bool {
        self.content_type.as_ref().is_some_and(is_html_mime)
    }

    /// `type/subtype` of the response, or an empty string
    pub fn essence(&self) -> &str {
        self.content_type.as_ref().map_or("", Mime::essence_str)
    }
}

/// Per-URL fetch failure; recorded and counted, never fatal to the run
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("connection failed for {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("request failed for {url}: {reason}")]
    Network { url: String, reason: String },
}

impl FetchError {
    fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        let url = url.to_string();
        if error.is_timeout() {
            Self::Timeout { url }
        } else if error.is_connect() {
            Self::Connect {
                url,
                reason: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            Self::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            Self::Network {
                url,
                reason: error.to_string(),
            }
        }
    }
}

/// Retrieves the bytes of one URL
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches `url`; `class` tells render-capable fetchers whether it is a page
    fn fetch(
        &self,
        url: &Url,
        class: UrlClass,
    ) -> impl Future<Output = Result<FetchedDocument, FetchError>> + Send;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The run configuration (user agent and request timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout)
        .connect_timeout(config.timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain network fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Sends one GET request, following redirects
    ///
    /// # Error Mapping
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Request exceeded the timeout | Timeout |
    /// | Connection refused / DNS / TLS | Connect |
    /// | Non-2xx final status | Status |
    /// | Body stream broke off | Body |
    /// | Anything else | Network |
    pub async fn get(&self, url: &Url) -> Result<FetchedDocument, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_type);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(FetchedDocument {
            url: url.clone(),
            final_url,
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
            rendered: false,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, _class: UrlClass) -> Result<FetchedDocument, FetchError> {
        self.get(url).await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Failure of the optional rendering step; the plain body is kept instead
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("browser did not finish within {0:?}")]
    Timeout(Duration),

    #[error("failed to launch browser: {0}")]
    Launch(#[from] std::io::Error),

    #[error("browser exited with {0}")]
    Exit(std::process::ExitStatus),

    #[error("browser produced an empty DOM")]
    Empty,
}

/// A headless browser that can dump the rendered DOM of a page
#[derive(Debug, Clone)]
pub struct BrowserRenderer {
    program: PathBuf,
    timeout: Duration,
}

impl BrowserRenderer {
    /// Uses an explicit browser binary
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Finds a usable browser
    ///
    /// An explicit `browser_path` wins if it points at a file; otherwise the
    /// well-known Chromium/Chrome binary names are searched on `PATH`.
    pub fn detect(explicit: Option<&Path>, timeout: Duration) -> Option<Self> {
        if let Some(path) = explicit {
            return path.is_file().then(|| Self::new(path, timeout));
        }

        let paths = std::env::var_os("PATH")?;
        std::env::split_paths(&paths)
            .flat_map(|dir| BROWSER_CANDIDATES.iter().map(move |name| dir.join(name)))
            .find(|candidate| candidate.is_file())
            .map(|program| Self::new(program, timeout))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Renders `url` within the renderer's own timeout
    pub async fn render(&self, url: &Url) -> Result<String, RenderError> {
        self.render_within(url, self.timeout).await
    }

    /// Renders `url` and returns the serialized DOM
    ///
    /// The child process is killed if `limit` elapses or the future is dropped.
    pub async fn render_within(&self, url: &Url, limit: Duration) -> Result<String, RenderError> {
        let mut command = Command::new(&self.program);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--dump-dom")
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| RenderError::Timeout(limit))??;

        if !output.status.success() {
            return Err(RenderError::Exit(output.status));
        }

        let dom = String::from_utf8_lossy(&output.stdout).into_owned();
        if dom.trim().is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(dom)
    }
}

/// Fetcher that renders the first `budget` HTML pages through a headless browser
///
/// The plain HTTP fetch always runs first and decides success or failure; the
/// rendered DOM only replaces the body when rendering works. A missing or
/// broken browser therefore never fails a URL.
#[derive(Debug)]
pub struct RenderingFetcher {
    http: HttpFetcher,
    renderer: BrowserRenderer,
    remaining: AtomicUsize,
}

impl RenderingFetcher {
    pub fn new(http: HttpFetcher, renderer: BrowserRenderer, budget: usize) -> Self {
        Self {
            http,
            renderer,
            remaining: AtomicUsize::new(budget),
        }
    }

    /// Claims one unit of the render budget, if any is left
    fn claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Pages that may still be rendered
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Time left for rendering once the plain fetch took `elapsed`
    ///
    /// Fetch and render share one timeout, so a URL never holds a worker
    /// longer than a single fetch timeout.
    fn render_budget(&self, elapsed: Duration) -> Option<Duration> {
        Some(self.renderer.timeout.saturating_sub(elapsed)).filter(|left| !left.is_zero())
    }
}

impl Fetcher for RenderingFetcher {
    async fn fetch(&self, url: &Url, class: UrlClass) -> Result<FetchedDocument, FetchError> {
        let started = Instant::now();
        let mut document = self.http.get(url).await?;

        if class != UrlClass::Page || !document.is_html() {
            return Ok(document);
        }
        let Some(budget) = self.render_budget(started.elapsed()) else {
            tracing::debug!("No time left to render {}", url);
            return Ok(document);
        };
        if !self.claim() {
            return Ok(document);
        }

        match self.renderer.render_within(&document.final_url, budget).await {
            Ok(dom) => {
                tracing::debug!("Rendered {} ({} bytes)", url, dom.len());
                document.body = dom.into_bytes();
                document.rendered = true;
            }
            Err(e) => {
                tracing::warn!("Rendering {} failed, keeping plain body: {}", url, e);
            }
        }
        Ok(document)
    }

    fn name(&self) -> &'static str {
        "rendering"
    }
}
