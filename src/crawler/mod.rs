//! Crawler module for fetching, extracting and coordinating a mirror run
//!
//! This module contains the core crawling logic, including:
//! - The frontier (FIFO queue, deduplication, page ceiling)
//! - HTTP fetching with an optional headless-browser rendering path
//! - Reference extraction from HTML and CSS
//! - The worker pool and the run coordinator
//! - The controller handle used to observe and cancel runs

mod controller;
mod coordinator;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
mod pool;

pub use controller::{mirror, start, RunHandle, RunStatus};
pub use coordinator::RunReport;
pub use extractor::{extract_css, extract_html, scan_image_urls, Extraction, Reference};
pub use fetcher::{
    build_http_client, BrowserRenderer, FetchError, FetchedDocument, Fetcher, HttpFetcher,
    RenderingFetcher,
};
pub use frontier::{Admission, Frontier, FrontierCounts, Outcome, Task, UrlRecord};
