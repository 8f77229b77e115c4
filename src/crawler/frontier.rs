//! Crawl frontier: the pending queue plus the record of every URL seen
//!
//! This module handles:
//! - Breadth-first (FIFO) ordering of discovered URLs
//! - Deduplication on the canonical URL string
//! - The page-admission ceiling (`max_pages`)
//! - Suspending workers while the queue is empty but work is still in flight
//!
//! The frontier is the only hard synchronization point of a run. Every
//! operation takes one short lock; nothing awaits while holding it.

use crate::state::UrlStatus;
use crate::url::UrlClass;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use url::Url;

/// A URL handed to a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// The canonical URL to fetch
    pub url: Url,

    /// Page or asset
    pub class: UrlClass,

    /// Number of links followed from the start URL
    pub depth: u32,
}

/// The record kept for every URL the frontier has accepted or refused
#[derive(Debug, Clone, Serialize)]
pub struct UrlRecord {
    pub url: Url,
    pub class: UrlClass,
    pub depth: u32,
    pub status: UrlStatus,
    /// Reason for a `Failed` status
    pub failure: Option<String>,
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Newly recorded and queued
    Admitted,
    /// Already recorded; nothing changed
    Duplicate,
    /// A page discovered after the ceiling was reached; recorded as not fetched
    LimitReached,
    /// External or invalid URLs never enter the frontier
    Rejected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// How a taken URL ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Failed(String),
}

/// Per-status totals of the URL records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrontierCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
    pub not_fetched: usize,
    /// Page-classified URLs admitted so far (never exceeds `max_pages`)
    pub pages_admitted: usize,
}

impl FrontierCounts {
    /// Total URLs recorded across all statuses
    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.done + self.failed + self.not_fetched
    }

    fn adjust(&mut self, status: UrlStatus, up: bool) {
        let slot = match status {
            UrlStatus::Pending => &mut self.pending,
            UrlStatus::InFlight => &mut self.in_flight,
            UrlStatus::Done => &mut self.done,
            UrlStatus::Failed => &mut self.failed,
            UrlStatus::NotFetched => &mut self.not_fetched,
        };
        if up {
            *slot += 1;
        } else {
            *slot = slot.saturating_sub(1);
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, UrlRecord>,
    queue: VecDeque<String>,
    counts: FrontierCounts,
    closed: bool,
}

impl Inner {
    fn set_status(&mut self, key: &str, next: UrlStatus) -> bool {
        let Some(record) = self.records.get_mut(key) else {
            return false;
        };
        let previous = record.status;
        if !previous.can_transition_to(next) {
            return false;
        }
        record.status = next;
        self.counts.adjust(previous, false);
        self.counts.adjust(next, true);
        true
    }
}

/// The shared work queue of one crawl run
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    max_pages: usize,
}

impl Frontier {
    /// Creates an empty frontier admitting at most `max_pages` pages
    pub fn new(max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            max_pages,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offers a classified URL to the frontier
    ///
    /// The check-and-insert happens under one lock, so concurrent offers of
    /// the same URL admit it exactly once.
    ///
    /// # Admission Rules
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Class is external or invalid | Rejected (not recorded) |
    /// | URL already recorded | Duplicate |
    /// | Page, and `max_pages` pages already admitted | LimitReached (recorded as not fetched) |
    /// | Otherwise | Admitted (queued as pending) |
    pub fn offer(&self, url: Url, class: UrlClass, depth: u32) -> Admission {
        if !class.is_fetchable() {
            return Admission::Rejected;
        }

        let key = url.as_str().to_string();
        let admission = {
            let mut inner = self.lock();
            if inner.records.contains_key(&key) {
                return Admission::Duplicate;
            }

            let limited = class == UrlClass::Page && inner.counts.pages_admitted >= self.max_pages;
            let status = if limited {
                UrlStatus::NotFetched
            } else {
                UrlStatus::Pending
            };

            inner.records.insert(
                key.clone(),
                UrlRecord {
                    url,
                    class,
                    depth,
                    status,
                    failure: None,
                },
            );
            inner.counts.adjust(status, true);

            if limited {
                Admission::LimitReached
            } else {
                if class == UrlClass::Page {
                    inner.counts.pages_admitted += 1;
                }
                inner.queue.push_back(key);
                Admission::Admitted
            }
        };

        if admission.is_admitted() {
            self.notify.notify_waiters();
        }
        admission
    }

    /// Takes the next pending URL in discovery order
    ///
    /// Suspends while the queue is empty but other workers still hold URLs
    /// that may produce more work.
    ///
    /// # Returns
    ///
    /// * `Some(Task)` - The URL is now in flight; the caller must `mark_done` it
    /// * `None` - The frontier was closed, or it is drained with nothing in flight
    pub async fn take(&self) -> Option<Task> {
        loop {
            let notified = {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }

                while let Some(key) = inner.queue.pop_front() {
                    if !inner.set_status(&key, UrlStatus::InFlight) {
                        continue;
                    }
                    if let Some(record) = inner.records.get(&key) {
                        return Some(Task {
                            url: record.url.clone(),
                            class: record.class,
                            depth: record.depth,
                        });
                    }
                }

                if inner.counts.in_flight == 0 {
                    return None;
                }

                // Registered before the lock is released so no wakeup is lost
                self.notify.notified()
            };
            notified.await;
        }
    }

    /// Records the outcome of a taken URL
    ///
    /// Returns false if the URL was not in flight (unknown, or already final).
    pub fn mark_done(&self, url: &Url, outcome: Outcome) -> bool {
        let changed = {
            let mut inner = self.lock();
            let (status, reason) = match outcome {
                Outcome::Done => (UrlStatus::Done, None),
                Outcome::Failed(reason) => (UrlStatus::Failed, Some(reason)),
            };
            let changed = inner.set_status(url.as_str(), status);
            if changed {
                if let Some(record) = inner.records.get_mut(url.as_str()) {
                    record.failure = reason;
                }
            }
            changed
        };

        if changed {
            self.notify.notify_waiters();
        }
        changed
    }

    /// Stops handing out work; every current and future `take` returns `None`
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn counts(&self) -> FrontierCounts {
        self.lock().counts
    }

    /// Looks up the record for a canonical URL
    pub fn get(&self, url: &Url) -> Option<UrlRecord> {
        self.lock().records.get(url.as_str()).cloned()
    }

    /// Snapshot of every record, in no particular order
    pub fn records(&self) -> Vec<UrlRecord> {
        self.lock().records.values().cloned().collect()
    }
}
