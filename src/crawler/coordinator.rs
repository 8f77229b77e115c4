//! Crawl coordinator - the body of one crawl run
//!
//! This module drives a run from start to terminal state:
//! - Preflight: the start URL must answer and the output root must be writable
//! - Seeding the frontier and choosing the fetcher (plain or rendering)
//! - Running the worker pool until the frontier drains or the run is cancelled
//! - The post-crawl rewrite pass, which also runs after cancellation

use crate::config::{Config, MirrorMode};
use crate::crawler::fetcher::{build_http_client, BrowserRenderer, HttpFetcher, RenderingFetcher};
use crate::crawler::frontier::{Frontier, FrontierCounts};
use crate::crawler::pool::{WorkerContext, WorkerPool};
use crate::mirror::MirrorWriter;
use crate::output::{format_bytes, CrawlStats, RunLog, StatsSnapshot};
use crate::state::{AtomicRunState, RunState};
use crate::url::{Scope, UrlClass};
use crate::MirrorError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

/// Name of the file used to probe that the output root accepts writes
const WRITE_PROBE: &str = ".sumi-write-probe";

/// State shared between a running crawl and its handle
#[derive(Debug)]
pub(crate) struct RunShared {
    pub start: Url,
    pub scope: Scope,
    pub frontier: Arc<Frontier>,
    pub writer: Arc<MirrorWriter>,
    pub stats: Arc<CrawlStats>,
    pub log: Arc<RunLog>,
    pub state: AtomicRunState,
    pub output_root: PathBuf,
}

impl RunShared {
    pub fn new(config: &Config, start: Url, scope: Scope) -> Self {
        let writer = MirrorWriter::new(config, &start, scope.clone());
        let output_root = match config.mode {
            MirrorMode::Mirror => writer.site_root().to_path_buf(),
            MirrorMode::Images => writer.images_root().to_path_buf(),
        };
        Self {
            frontier: Arc::new(Frontier::new(config.max_pages)),
            writer: Arc::new(writer),
            stats: Arc::new(CrawlStats::new()),
            log: Arc::new(RunLog::new()),
            state: AtomicRunState::new(RunState::Idle),
            start,
            scope,
            output_root,
        }
    }
}

/// Final summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub stats: StatsSnapshot,
    pub frontier: FrontierCounts,
    /// Root directory the run wrote into
    pub output_dir: PathBuf,
    /// In-scope references still pointing at the network after the rewrite pass
    pub unresolved_references: usize,
}

/// Executes one run to its terminal state
///
/// Setup failures move the run to `Failed` and are returned; everything
/// after setup is per-URL and only shows up in the statistics.
pub(crate) async fn execute(
    shared: Arc<RunShared>,
    config: Config,
    cancel: watch::Receiver<bool>,
) -> Result<RunReport, MirrorError> {
    if !shared.state.transition(RunState::Running) {
        return Ok(report(&shared, shared.state.get(), 0));
    }
    tracing::info!("Starting {} run for {}", mode_label(config.mode), shared.start);
    shared.log.push(format!(
        "Starting {} of {} (max {} pages, {} workers)",
        mode_label(config.mode),
        shared.start,
        config.max_pages,
        config.max_workers
    ));

    match setup(&shared, &config).await {
        Ok(http) => crawl(&shared, &config, http, cancel).await,
        Err(e) => {
            tracing::error!("Run failed during setup: {}", e);
            shared.log.push(format!("[error] {}", e));
            shared.state.transition(RunState::Failed);
            Err(e)
        }
    }
}

/// Builds the client, checks the start URL and prepares the output root
async fn setup(shared: &RunShared, config: &Config) -> Result<HttpFetcher, MirrorError> {
    let http = HttpFetcher::new(build_http_client(config)?);

    match http.get(&shared.start).await {
        Ok(document) => {
            tracing::debug!(
                "Start URL answered {} ({})",
                document.status,
                document.essence()
            );
        }
        Err(e) => {
            return Err(MirrorError::UnreachableStart {
                url: shared.start.to_string(),
                reason: e.to_string(),
            })
        }
    }

    prepare_output(&shared.output_root).await?;
    Ok(http)
}

/// Creates `root` and checks that files can be written into it
async fn prepare_output(root: &Path) -> Result<(), MirrorError> {
    let unwritable = |source| MirrorError::OutputUnwritable {
        path: root.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(root).await.map_err(unwritable)?;
    let probe = root.join(WRITE_PROBE);
    tokio::fs::write(&probe, b"").await.map_err(unwritable)?;
    tokio::fs::remove_file(&probe).await.map_err(unwritable)?;
    Ok(())
}

async fn crawl(
    shared: &Arc<RunShared>,
    config: &Config,
    http: HttpFetcher,
    cancel: watch::Receiver<bool>,
) -> Result<RunReport, MirrorError> {
    shared
        .frontier
        .offer(shared.start.clone(), UrlClass::Page, 0);

    let context = WorkerContext {
        frontier: Arc::clone(&shared.frontier),
        scope: shared.scope.clone(),
        writer: Arc::clone(&shared.writer),
        stats: Arc::clone(&shared.stats),
        log: Arc::clone(&shared.log),
        mode: config.mode,
        delay: config.delay,
    };

    let renderer = if config.render_pages > 0 {
        let found = BrowserRenderer::detect(config.browser_path.as_deref(), config.timeout);
        if found.is_none() {
            tracing::warn!("No headless browser found; pages will not be rendered");
            shared
                .log
                .push("No headless browser found; continuing without rendering");
        }
        found
    } else {
        None
    };

    match renderer {
        Some(renderer) => {
            tracing::info!(
                "Rendering up to {} pages with {}",
                config.render_pages,
                renderer.program().display()
            );
            let fetcher = RenderingFetcher::new(http, renderer, config.render_pages);
            WorkerPool::new(fetcher, context, config.max_workers)
                .run(cancel.clone())
                .await;
        }
        None => {
            WorkerPool::new(http, context, config.max_workers)
                .run(cancel.clone())
                .await;
        }
    }

    let cancelled = *cancel.borrow();
    if cancelled {
        tracing::info!("Crawl cancelled; finishing written documents");
        shared.log.push("Cancelled; finishing written documents");
    }

    let mut unresolved = 0;
    if config.mode == MirrorMode::Mirror {
        let finished = shared.writer.finish().await;
        shared.stats.record_rewritten(finished.rewritten as u64);
        unresolved = finished.unresolved;
        if finished.failed > 0 {
            tracing::warn!("{} documents could not be rewritten", finished.failed);
        }
        tracing::info!(
            "Rewrite pass: {} documents updated, {} references left absolute",
            finished.rewritten,
            finished.unresolved
        );
    }

    let terminal = if cancelled {
        RunState::Cancelled
    } else {
        RunState::Completed
    };
    shared.state.transition(terminal);

    let report = report(shared, terminal, unresolved);
    tracing::info!(
        "Crawl {}: {} pages, {} assets, {} failures, {} written in {:?}",
        terminal,
        report.stats.pages_fetched,
        report.stats.assets_fetched,
        report.stats.failures,
        format_bytes(report.stats.bytes_written),
        report.stats.elapsed()
    );
    shared.log.push(format!(
        "Run {}: {} pages, {} assets, {} images, {} failures, {} written",
        terminal,
        report.stats.pages_fetched,
        report.stats.assets_fetched,
        report.stats.images_fetched,
        report.stats.failures,
        format_bytes(report.stats.bytes_written)
    ));

    Ok(report)
}

fn report(shared: &RunShared, state: RunState, unresolved: usize) -> RunReport {
    RunReport {
        state,
        stats: shared.stats.snapshot(),
        frontier: shared.frontier.counts(),
        output_dir: shared.output_root.clone(),
        unresolved_references: unresolved,
    }
}

fn mode_label(mode: MirrorMode) -> &'static str {
    match mode {
        MirrorMode::Mirror => "mirror",
        MirrorMode::Images => "images-only crawl",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_output_creates_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("a/b/site.test");
        prepare_output(&root).await.unwrap();
        assert!(root.is_dir());
        assert!(!root.join(WRITE_PROBE).exists());
    }

    #[tokio::test]
    async fn test_prepare_output_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("taken");
        std::fs::write(&root, b"not a directory").unwrap();

        let err = prepare_output(&root).await.unwrap_err();
        assert!(matches!(err, MirrorError::OutputUnwritable { .. }));
    }

    #[test]
    fn test_output_root_follows_mode() {
        let start = Url::parse("https://site.test/").unwrap();
        let scope = Scope::new(&start, Vec::new(), true).unwrap();

        let mut config = Config::new("https://site.test/");
        config.output_dir = PathBuf::from("out");
        let mirror = RunShared::new(&config, start.clone(), scope.clone());
        assert_eq!(mirror.output_root, PathBuf::from("out/site.test"));

        config.mode = MirrorMode::Images;
        let images = RunShared::new(&config, start, scope);
        assert_eq!(images.output_root, PathBuf::from("out/site.test-images"));
    }
}
