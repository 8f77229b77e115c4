//! Output module for run statistics, the run log and file previews
//!
//! This module handles:
//! - Lock-free statistics counters and their snapshots
//! - The timestamped run log with live streaming
//! - Preview payloads for files appearing in the output directory
//! - The end-of-run summary printed by the command line tool

mod log;
mod preview;
pub mod stats;

pub use log::{LogStream, RunLog, LOG_CAPACITY, STATUS_LINES};
pub use preview::{mime_for_extension, PreviewItem, PreviewKind, PreviewScanner, PREVIEW_LIMIT};
pub use stats::{format_bytes, CrawlStats, StatsSnapshot};

use crate::crawler::RunReport;

/// Prints a human-readable summary of a finished run
pub fn print_summary(report: &RunReport) {
    let stats = &report.stats;
    let frontier = &report.frontier;

    println!("=== Mirror Summary ===\n");

    println!("Run:");
    println!("  State: {}", report.state);
    println!("  Output: {}", report.output_dir.display());
    println!("  Duration: {:.1}s", stats.elapsed().as_secs_f64());
    println!();

    println!("Fetched:");
    println!("  Pages: {}", stats.pages_fetched);
    println!("  Assets: {}", stats.assets_fetched);
    println!("  Images: {}", stats.images_fetched);
    println!("  Written: {}", format_bytes(stats.bytes_written));
    println!();

    println!("Frontier:");
    println!("  URLs recorded: {}", frontier.total());
    println!("  Done: {}", frontier.done);
    println!("  Failed: {}", frontier.failed);
    println!("  Not fetched (page limit): {}", frontier.not_fetched);
    if frontier.pending + frontier.in_flight > 0 {
        println!(
            "  Left pending: {}",
            frontier.pending + frontier.in_flight
        );
    }
    println!("  External references skipped: {}", stats.external_skipped);
    println!();

    if stats.documents_rewritten > 0 || report.unresolved_references > 0 {
        println!("Rewriting:");
        println!("  Documents updated after crawl: {}", stats.documents_rewritten);
        println!(
            "  References left absolute: {}",
            report.unresolved_references
        );
        println!();
    }

    if stats.degraded_documents > 0 {
        println!(
            "Note: {} documents were only partially parsed",
            stats.degraded_documents
        );
    }
}
