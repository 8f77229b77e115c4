//! Human-readable run log
//!
//! Lines are timestamped, kept in a bounded ring for status polling and
//! fanned out on a broadcast channel for live streaming. Closing the log
//! (at the terminal state) ends every stream.

use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Lines kept in the ring
pub const LOG_CAPACITY: usize = 1000;

/// Lines returned by a status poll
pub const STATUS_LINES: usize = 50;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct Ring {
    lines: VecDeque<String>,
    sender: Option<broadcast::Sender<String>>,
}

/// The log of one crawl run
#[derive(Debug)]
pub struct RunLog {
    ring: Mutex<Ring>,
    capacity: usize,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            ring: Mutex::new(Ring {
                lines: VecDeque::with_capacity(capacity.min(LOG_CAPACITY)),
                sender: Some(sender),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a line, prefixed with the local time
    ///
    /// Lines pushed after `close` are kept in the ring but not streamed.
    pub fn push(&self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        let mut ring = self.lock();
        if ring.lines.len() == self.capacity {
            ring.lines.pop_front();
        }
        ring.lines.push_back(line.clone());
        if let Some(sender) = &ring.sender {
            // No receivers is fine
            let _ = sender.send(line);
        }
    }

    /// The most recent `n` lines, oldest first
    pub fn recent(&self, n: usize) -> Vec<String> {
        let ring = self.lock();
        let skip = ring.lines.len().saturating_sub(n);
        ring.lines.iter().skip(skip).cloned().collect()
    }

    /// Every line still in the ring
    pub fn lines(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    /// Starts a stream of the backlog followed by live lines
    pub fn subscribe(&self) -> LogStream {
        let ring = self.lock();
        LogStream {
            backlog: ring.lines.clone(),
            receiver: ring.sender.as_ref().map(|sender| sender.subscribe()),
        }
    }

    /// Ends all streams once they have drained
    pub fn close(&self) {
        self.lock().sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().sender.is_none()
    }
}

/// A finite stream of log lines
///
/// Yields the lines that were in the ring when the stream started, then
/// every line pushed afterwards, and ends once the run log is closed.
#[derive(Debug)]
pub struct LogStream {
    backlog: VecDeque<String>,
    receiver: Option<broadcast::Receiver<String>>,
}

impl LogStream {
    /// The next line, or `None` once the run has ended
    pub async fn next(&mut self) -> Option<String> {
        if let Some(line) = self.backlog.pop_front() {
            return Some(line);
        }

        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(line) => return Some(line),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Log stream lagged, skipped {} lines", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// Drains the stream into a vector (ends when the run does)
    pub async fn collect(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next().await {
            lines.push(line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_lines() {
        let log = RunLog::new();
        log.push("started");
        let lines = log.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] started"));
    }

    #[test]
    fn test_ring_is_capped() {
        let log = RunLog::with_capacity(3);
        for i in 0..5 {
            log.push(format!("line {}", i));
        }
        let lines = log.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("line 2"));
        assert!(lines[2].ends_with("line 4"));
    }

    #[test]
    fn test_recent() {
        let log = RunLog::new();
        for i in 0..60 {
            log.push(format!("line {}", i));
        }
        let recent = log.recent(STATUS_LINES);
        assert_eq!(recent.len(), 50);
        assert!(recent[0].ends_with("line 10"));
        assert_eq!(log.recent(5).len(), 5);
    }

    #[tokio::test]
    async fn test_stream_backlog_then_live_then_end() {
        let log = RunLog::new();
        log.push("one");
        let mut stream = log.subscribe();
        log.push("two");
        log.close();
        log.push("after close");

        assert!(stream.next().await.unwrap().ends_with("one"));
        assert!(stream.next().await.unwrap().ends_with("two"));
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_after_close_is_backlog_only() {
        let log = RunLog::new();
        log.push("a");
        log.push("b");
        log.close();
        assert!(log.is_closed());

        let lines = log.subscribe().collect().await;
        assert_eq!(lines.len(), 2);
    }
}
