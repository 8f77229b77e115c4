//! Worker pool - concurrent fetch, extract and write
//!
//! Each worker loops over the shared frontier:
//! 1. Takes the next task (suspending while others may still discover work)
//! 2. Fetches it through the run's [`Fetcher`]
//! 3. Offers every newly discovered reference to the frontier
//! 4. Writes the document (mirror tree or flat images directory)
//! 5. Marks the URL done or failed, then waits the politeness delay
//!
//! Discovered URLs are offered before the task is marked done, so the
//! frontier can never look drained while a worker is about to add to it.

use crate::config::MirrorMode;
use crate::crawler::extractor::{extract_css, extract_html, scan_image_urls, Reference};
use crate::crawler::fetcher::{FetchedDocument, Fetcher};
use crate::crawler::frontier::{Admission, Frontier, Outcome, Task};
use crate::mirror::{is_image_document, DocumentKind, MirrorWriter, WriteReport};
use crate::output::{CrawlStats, RunLog};
use crate::url::{canonicalize, is_image_url, LinkHint, Scope, UrlClass};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Everything a worker shares with the rest of the run
pub(crate) struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub scope: Scope,
    pub writer: Arc<MirrorWriter>,
    pub stats: Arc<CrawlStats>,
    pub log: Arc<RunLog>,
    pub mode: MirrorMode,
    pub delay: Duration,
}

/// A fixed number of workers driving one fetcher
pub(crate) struct WorkerPool<F: Fetcher> {
    fetcher: Arc<F>,
    context: Arc<WorkerContext>,
    workers: usize,
}

impl<F: Fetcher> WorkerPool<F> {
    pub fn new(fetcher: F, context: WorkerContext, workers: usize) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            context: Arc::new(context),
            workers: workers.max(1),
        }
    }

    /// Runs the workers until the frontier drains or the run is cancelled
    ///
    /// Cancellation closes the frontier, so idle workers return at once and
    /// busy workers return after their current task.
    pub async fn run(self, cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Starting {} workers ({} fetcher)",
            self.workers,
            self.fetcher.name()
        );

        let watcher = {
            let frontier = Arc::clone(&self.context.frontier);
            let mut cancel = cancel.clone();
            tokio::spawn(async move {
                while !*cancel.borrow() {
                    if cancel.changed().await.is_err() {
                        return;
                    }
                }
                frontier.close();
            })
        };

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            workers.spawn(worker_loop(
                id,
                Arc::clone(&self.fetcher),
                Arc::clone(&self.context),
                cancel.clone(),
            ));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker task ended abnormally: {}", e);
            }
        }
        watcher.abort();
    }
}

async fn worker_loop<F: Fetcher>(
    id: usize,
    fetcher: Arc<F>,
    context: Arc<WorkerContext>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut processed = 0usize;

    loop {
        if *cancel.borrow() {
            break;
        }
        let Some(task) = context.frontier.take().await else {
            break;
        };

        context.process(fetcher.as_ref(), &task).await;
        processed += 1;

        // A closed channel means the run can no longer be cancelled; keep pacing
        if !context.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(context.delay) => {}
                Ok(()) = cancel.changed() => {}
            }
        }
    }

    tracing::debug!("Worker {} finished after {} tasks", id, processed);
}

impl WorkerContext {
    async fn process<F: Fetcher>(&self, fetcher: &F, task: &Task) {
        tracing::debug!("Processing {} ({}, depth {})", task.url, task.class, task.depth);

        let document = match fetcher.fetch(&task.url, task.class).await {
            Ok(document) => document,
            Err(e) => {
                self.fail(task, format!("fetch error: {}", e));
                return;
            }
        };

        match self.mode {
            MirrorMode::Mirror => self.mirror_document(task, &document).await,
            MirrorMode::Images => self.collect_images(task, &document).await,
        }
    }

    /// Full mirror: follow page references, write everything, rewrite links
    async fn mirror_document(&self, task: &Task, document: &FetchedDocument) {
        let kind = DocumentKind::of(document);
        let mut base = document.final_url.clone();

        match kind {
            DocumentKind::Html => {
                let extraction = extract_html(&document.body, &document.final_url);
                if extraction.degraded {
                    self.stats.record_degraded();
                    tracing::debug!("Parsed {} with recovery", task.url);
                }
                // HTML reached as an asset (an iframe target, say) is kept but not followed
                if task.class == UrlClass::Page {
                    self.offer_references(&extraction.references, task.depth + 1);
                }
                base = extraction.base;
            }
            DocumentKind::Css => {
                let extraction = extract_css(&document.body, &document.final_url);
                self.offer_references(&extraction.references, task.depth + 1);
            }
            DocumentKind::Other => {}
        }

        match self.writer.write_mirror(document, kind, &base).await {
            Ok(report) => {
                self.record_written(task, document, kind, &report);
                self.frontier.mark_done(&task.url, Outcome::Done);
            }
            Err(e) => self.fail(task, format!("write error: {}", e)),
        }
    }

    /// Images only: traverse pages for image references, write images flat
    ///
    /// Only page-class HTML is traversed. An image slot answering with HTML
    /// (a soft 404, say) goes to the image writer and fails as not-an-image.
    async fn collect_images(&self, task: &Task, document: &FetchedDocument) {
        if task.class == UrlClass::Page && document.is_html() {
            let extraction = extract_html(&document.body, &document.final_url);
            if extraction.degraded {
                self.stats.record_degraded();
            }
            self.offer_references(&extraction.references, task.depth + 1);

            let loose = scan_image_urls(&document.body, &extraction.base);
            self.offer_references(&loose, task.depth + 1);

            self.stats.record_page();
            self.log.push(format!("[page] {}", task.url));
            self.frontier.mark_done(&task.url, Outcome::Done);
            return;
        }

        match self.writer.write_image(document).await {
            Ok(report) => {
                self.stats.record_image();
                self.stats.record_bytes(report.bytes);
                tracing::info!("Saved image {} -> {}", task.url, report.path.display());
                self.log
                    .push(format!("[image] {} -> {}", task.url, report.path.display()));
                self.frontier.mark_done(&task.url, Outcome::Done);
            }
            Err(e) => self.fail(task, e.to_string()),
        }
    }

    fn offer_references(&self, references: &[Reference], depth: u32) {
        for reference in references {
            let url = match canonicalize(reference.url.clone()) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!("Dropping reference {}: {}", reference.raw, e);
                    continue;
                }
            };

            let class = self.scope.class_of(&url, reference.hint);
            if self.mode == MirrorMode::Images
                && class == UrlClass::Asset
                && reference.hint != LinkHint::Image
                && !is_image_url(&url)
            {
                continue;
            }

            match self.frontier.offer(url, class, depth) {
                Admission::Admitted => self.stats.record_discovered(),
                Admission::LimitReached => self.stats.record_not_fetched(),
                Admission::Rejected if class == UrlClass::External => {
                    self.stats.record_external()
                }
                Admission::Rejected | Admission::Duplicate => {}
            }
        }
    }

    fn record_written(
        &self,
        task: &Task,
        document: &FetchedDocument,
        kind: DocumentKind,
        report: &WriteReport,
    ) {
        if task.class == UrlClass::Page && kind == DocumentKind::Html {
            self.stats.record_page();
        } else {
            self.stats.record_asset();
        }
        if is_image_document(document) {
            self.stats.record_image();
        }
        self.stats.record_bytes(report.bytes);

        let label = if task.class == UrlClass::Page {
            "page"
        } else {
            "asset"
        };
        tracing::info!("Saved {} {} -> {}", label, task.url, report.path.display());
        self.log.push(format!(
            "[{}] {} -> {}",
            label,
            task.url,
            report.path.display()
        ));
    }

    fn fail(&self, task: &Task, reason: String) {
        self.stats.record_failure();
        tracing::warn!("Failed {}: {}", task.url, reason);
        self.log.push(format!("[failed] {} ({})", task.url, reason));
        self.frontier.mark_done(&task.url, Outcome::Failed(reason));
    }
}
