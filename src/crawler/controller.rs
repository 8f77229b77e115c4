//! Crawl controller - starting, observing and cancelling runs
//!
//! A run is started with [`start`], which validates the configuration and
//! spawns the coordinator on the current Tokio runtime. The returned
//! [`RunHandle`] is the only way to observe or stop the run.

use crate::config::{validate, Config};
use crate::crawler::coordinator::{self, RunReport, RunShared};
use crate::crawler::frontier::{FrontierCounts, UrlRecord};
use crate::output::{LogStream, PreviewScanner, StatsSnapshot, STATUS_LINES};
use crate::state::RunState;
use crate::url::{normalize_url, Scope};
use crate::{ConfigError, MirrorError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A point-in-time view of a run, safe to take at any moment
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub stats: StatsSnapshot,
    pub frontier: FrontierCounts,
    /// The newest log lines, oldest first
    pub recent_log: Vec<String>,
}

/// Handle to a started run
#[derive(Debug)]
pub struct RunHandle {
    shared: Arc<RunShared>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<RunReport, MirrorError>>,
}

/// Starts a crawl run in the background
///
/// Must be called from within a Tokio runtime.
///
/// # Returns
///
/// * `Ok(RunHandle)` - The run was started (it may still fail during setup)
/// * `Err(ConfigError)` - The configuration is invalid; nothing was started
pub fn start(config: Config) -> Result<RunHandle, ConfigError> {
    validate(&config)?;
    let start = normalize_url(&config.start_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.start_url, e)))?;
    let scope = Scope::new(
        &start,
        config.domain_aliases.clone(),
        config.same_domain_only,
    )
    .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.start_url, e)))?;

    let shared = Arc::new(RunShared::new(&config, start, scope));
    let (cancel, cancelled) = watch::channel(false);

    let task = {
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let result = coordinator::execute(Arc::clone(&shared), config, cancelled).await;
            shared.log.close();
            result
        })
    };

    Ok(RunHandle {
        shared,
        cancel,
        task,
    })
}

/// Runs a crawl to completion
///
/// # Returns
///
/// * `Ok(RunReport)` - The run reached `Completed` or `Cancelled`
/// * `Err(MirrorError)` - Invalid configuration or a setup failure
pub async fn mirror(config: Config) -> Result<RunReport, MirrorError> {
    start(config)?.wait().await
}

impl RunHandle {
    /// Requests cancellation
    ///
    /// No new URLs are dispatched afterwards; in-flight fetches finish
    /// (bounded by the request timeout) and the rewrite pass still runs.
    /// Cancelling a finished run does nothing.
    pub fn cancel(&self) {
        if self
            .shared
            .state
            .transition_from(RunState::Idle, RunState::Cancelled)
        {
            tracing::info!("Run cancelled before it started");
        }
        self.cancel.send_replace(true);
        self.shared.frontier.close();
        self.shared.log.push("Cancellation requested");
    }

    pub fn state(&self) -> RunState {
        self.shared.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            state: self.shared.state.get(),
            stats: self.shared.stats.snapshot(),
            frontier: self.shared.frontier.counts(),
            recent_log: self.shared.log.recent(STATUS_LINES),
        }
    }

    /// Streams the log from its oldest retained line; ends with the run
    pub fn stream_log(&self) -> LogStream {
        self.shared.log.subscribe()
    }

    /// Every URL the frontier has recorded, in no particular order
    pub fn url_records(&self) -> Vec<UrlRecord> {
        self.shared.frontier.records()
    }

    /// Root directory this run writes into
    pub fn output_dir(&self) -> &Path {
        &self.shared.output_root
    }

    /// A scanner reporting files as they appear in the output directory
    pub fn preview_scanner(&self) -> PreviewScanner {
        PreviewScanner::new(self.shared.output_root.clone())
    }

    /// Waits for the run to reach its terminal state
    pub async fn wait(self) -> Result<RunReport, MirrorError> {
        self.task.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_config_starts_nothing() {
        let mut config = Config::new("https://site.test/");
        config.max_workers = 0;
        assert!(start(config).is_err());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new("http://127.0.0.1:9/");
        config.output_dir = dir.path().to_path_buf();

        let handle = start(config).unwrap();
        handle.cancel();
        assert_eq!(handle.state(), RunState::Cancelled);

        let report = handle.wait().await.unwrap();
        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.stats.pages_fetched, 0);
    }

    #[tokio::test]
    async fn test_unreachable_start_fails_run() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::new("http://127.0.0.1:9/");
        config.output_dir = dir.path().to_path_buf();

        let handle = start(config).unwrap();
        let stream = handle.stream_log();
        let shared = Arc::clone(&handle.shared);

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, MirrorError::UnreachableStart { .. }));
        assert_eq!(shared.state.get(), RunState::Failed);
        assert!(shared.log.is_closed());

        let lines = stream.collect().await;
        assert!(lines.iter().any(|l| l.contains("[error]")));
    }
}
