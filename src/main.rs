//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror site mirroring engine.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use sumi_mirror::config::{load_config_with_hash, validate, Config, MirrorMode};
use sumi_mirror::output::print_summary;
use sumi_mirror::{start, RunState};
use tracing_subscriber::EnvFilter;

/// Sumi-Mirror: an offline site mirroring engine
///
/// Sumi-Mirror crawls a website breadth-first, saves every page and asset
/// under a local directory that mirrors the site, and rewrites links so the
/// copy can be browsed offline. In images mode it collects every image into
/// one flat directory instead.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version = "1.0.0")]
#[command(about = "An offline site mirroring engine", long_about = None)]
struct Cli {
    /// Path to the `key = value` configuration file
    #[arg(value_name = "CONFIG", default_value = "config.txt")]
    config: PathBuf,

    /// Start URL; when given, the configuration file is optional
    #[arg(long)]
    url: Option<String>,

    /// Override the output mode (mirror or images)
    #[arg(long)]
    mode: Option<MirrorMode>,

    /// Override the output directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Override the page ceiling
    #[arg(long)]
    max_pages: Option<usize>,

    /// Override the number of workers
    #[arg(long)]
    max_workers: Option<usize>,

    /// Override the per-worker delay, in seconds
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Print the final report as JSON instead of the text summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_mirror(config, cli.json).await
}

/// Loads the configuration file (optional when `--url` is given) and applies overrides
fn load(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if cli.url.is_some() && !cli.config.exists() {
        Config::new(String::new())
    } else {
        tracing::info!("Loading configuration from: {}", cli.config.display());
        let (config, hash) = load_config_with_hash(&cli.config)?;
        tracing::info!("Configuration loaded successfully (hash: {})", hash);
        config
    };

    if let Some(url) = &cli.url {
        config.start_url = url.clone();
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(max_pages) = cli.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(max_workers) = cli.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(delay) = cli.delay {
        config.delay = Duration::try_from_secs_f64(delay)?;
    }

    validate(&config)?;
    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_mirror=info,warn"),
            1 => EnvFilter::new("sumi_mirror=debug,info"),
            2 => EnvFilter::new("sumi_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Crawl:");
    println!("  Start URL: {}", config.start_url);
    println!("  Mode: {}", config.mode);
    println!("  Max pages: {}", config.max_pages);
    println!("  Workers: {}", config.max_workers);
    println!("  Delay: {:?}", config.delay);
    println!("  Timeout: {:?}", config.timeout);
    println!("  Same domain only: {}", config.same_domain_only);

    if !config.domain_aliases.is_empty() {
        println!("\nDomain Aliases ({}):", config.domain_aliases.len());
        for alias in &config.domain_aliases {
            println!("  - {}", alias);
        }
    }

    println!("\nOutput:");
    println!("  Directory: {}", config.output_dir.display());
    println!("  Collect images: {}", config.collect_images);
    if config.render_pages > 0 {
        println!("  Rendered pages: {}", config.render_pages);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main mirror operation
async fn handle_mirror(config: Config, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let handle = start(config)?;
    tracing::info!("Writing to {}", handle.output_dir().display());

    // First Ctrl+C cancels gracefully, a second one exits immediately
    let (cancel_tx, mut cancel_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling; finishing in-flight requests (Ctrl+C again to force quit)");
            let _ = cancel_tx.send(()).await;
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Force quit");
                std::process::exit(1);
            }
        }
    });

    let mut stream = handle.stream_log();
    loop {
        tokio::select! {
            line = stream.next() => match line {
                Some(line) => tracing::debug!("{}", line),
                None => break,
            },
            Some(()) = cancel_rx.recv() => handle.cancel(),
        }
    }

    let report = match handle.wait().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Mirror failed: {}", e);
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if report.state == RunState::Cancelled {
        tracing::warn!("Run was cancelled; the mirror is partial");
    }
    Ok(())
}
