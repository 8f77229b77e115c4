//! Statistics aggregation for a crawl run
//!
//! Every counter is an independent atomic, so workers record completed work
//! without sharing a lock with the frontier or the path map.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters of one crawl run
#[derive(Debug)]
pub struct CrawlStats {
    started: Instant,
    pages_fetched: AtomicU64,
    assets_fetched: AtomicU64,
    images_fetched: AtomicU64,
    bytes_written: AtomicU64,
    failures: AtomicU64,
    discovered: AtomicU64,
    external_skipped: AtomicU64,
    not_fetched: AtomicU64,
    documents_rewritten: AtomicU64,
    degraded_documents: AtomicU64,
}

/// A point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub pages_fetched: u64,
    pub assets_fetched: u64,
    pub images_fetched: u64,
    pub bytes_written: u64,
    pub failures: u64,
    /// URLs newly admitted to the frontier
    pub discovered: u64,
    /// Out-of-scope references that were never enqueued
    pub external_skipped: u64,
    /// Pages refused by the page ceiling
    pub not_fetched: u64,
    /// Documents updated by the post-crawl rewrite pass
    pub documents_rewritten: u64,
    /// Documents the parser could only partially read
    pub degraded_documents: u64,
    pub elapsed_ms: u64,
}

impl StatsSnapshot {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            pages_fetched: AtomicU64::new(0),
            assets_fetched: AtomicU64::new(0),
            images_fetched: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            discovered: AtomicU64::new(0),
            external_skipped: AtomicU64::new(0),
            not_fetched: AtomicU64::new(0),
            documents_rewritten: AtomicU64::new(0),
            degraded_documents: AtomicU64::new(0),
        }
    }

    pub fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_asset(&self) {
        self.assets_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_image(&self) {
        self.images_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_external(&self) {
        self.external_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_fetched(&self) {
        self.not_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rewritten(&self, documents: u64) {
        self.documents_rewritten.fetch_add(documents, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_documents.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            assets_fetched: self.assets_fetched.load(Ordering::Relaxed),
            images_fetched: self.images_fetched.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            external_skipped: self.external_skipped.load(Ordering::Relaxed),
            not_fetched: self.not_fetched.load(Ordering::Relaxed),
            documents_rewritten: self.documents_rewritten.load(Ordering::Relaxed),
            degraded_documents: self.degraded_documents.load(Ordering::Relaxed),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Formats a byte count for humans
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
