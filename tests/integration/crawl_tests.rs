//! Integration tests for the mirror engine
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, from the start URL to the files on disk.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sumi_mirror::crawler::UrlRecord;
use sumi_mirror::mirror::flat_image_name;
use sumi_mirror::{start, Config, MirrorError, MirrorMode, RunHandle, RunReport, RunState};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration writing under `output`
fn test_config(base_url: &str, output: &Path) -> Config {
    let mut config = Config::new(format!("{}/", base_url));
    config.delay = Duration::ZERO;
    config.max_workers = 4;
    config.timeout = Duration::from_secs(5);
    config.output_dir = output.to_path_buf();
    config
}

async fn mount_html(server: &MockServer, at: &str, html: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(server)
        .await;
}

async fn mount_bytes(server: &MockServer, at: &str, body: &[u8], mime: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_vec(), mime))
        .mount(server)
        .await;
}

/// Mounts a route that must never be requested
async fn mount_never(server: &MockServer, at: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>never</p>", "text/html"))
        .expect(0)
        .mount(server)
        .await;
}

/// Drains the log (which ends with the run), then collects the records and the report
async fn finish(handle: RunHandle) -> (Result<RunReport, MirrorError>, Vec<UrlRecord>, Vec<String>) {
    let lines = handle.stream_log().collect().await;
    let records = handle.url_records();
    let result = handle.wait().await;
    (result, records, lines)
}

/// Every file under `root`, relative to it, sorted
fn files_under(root: &Path) -> Vec<PathBuf> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

/// Expected flat images-directory names for paths on the mock server
fn flat_names(base: &str, paths: &[&str]) -> Vec<PathBuf> {
    let mut names: Vec<PathBuf> = paths
        .iter()
        .map(|p| {
            let url = Url::parse(&format!("{}{}", base, p)).unwrap();
            PathBuf::from(flat_image_name(&url, None))
        })
        .collect();
    names.sort();
    names
}

/// Local (non-network) `href`/`src` values in an HTML file
fn local_links(html: &str) -> Vec<String> {
    let attr = Regex::new(r#"(?:href|src)="([^"]*)""#).unwrap();
    attr.captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|v| !v.starts_with("http://") && !v.starts_with("https://") && !v.is_empty())
        .map(|v| v.split(['#', '?']).next().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn test_full_mirror_rewrites_links() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<html><head><title>Home</title>
        <link rel="stylesheet" href="/css/site.css"></head><body>
        <a href="/about">About</a>
        <a href="http://external.invalid/page">Elsewhere</a>
        <img src="/img/logo.png">
        </body></html>"#
            .to_string(),
    )
    .await;
    mount_html(
        &server,
        "/about",
        r#"<html><body><a href="/">Home</a><img src="/img/logo.png"></body></html>"#.to_string(),
    )
    .await;
    mount_bytes(
        &server,
        "/css/site.css",
        br#"body { background: url("../img/bg.png"); }"#,
        "text/css",
    )
    .await;
    mount_bytes(&server, "/img/logo.png", b"\x89PNG logo", "image/png").await;
    mount_bytes(&server, "/img/bg.png", b"\x89PNG bg", "image/png").await;

    let out = TempDir::new().unwrap();
    let mut config = test_config(&base, out.path());
    config.collect_images = true;

    let (result, records, _) = finish(start(config).unwrap()).await;
    let report = result.expect("mirror failed");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.stats.pages_fetched, 2);
    assert_eq!(report.stats.assets_fetched, 3);
    assert_eq!(report.stats.images_fetched, 2);
    assert_eq!(report.stats.failures, 0);
    assert_eq!(report.unresolved_references, 0);

    // The external link was never enqueued
    assert!(report.stats.external_skipped >= 1);
    assert!(records
        .iter()
        .all(|r| r.url.host_str() != Some("external.invalid")));

    let site = out.path().join("127.0.0.1");
    assert_eq!(report.output_dir, site);
    assert_eq!(
        files_under(&site),
        vec![
            PathBuf::from("about/index.html"),
            PathBuf::from("css/site.css"),
            PathBuf::from("img/bg.png"),
            PathBuf::from("img/logo.png"),
            PathBuf::from("index.html"),
        ]
    );

    let index = std::fs::read_to_string(site.join("index.html")).unwrap();
    assert!(index.contains(r#"href="about/index.html""#));
    assert!(index.contains(r#"href="css/site.css""#));
    assert!(index.contains(r#"src="img/logo.png""#));
    assert!(index.contains("http://external.invalid/page"));

    let about = std::fs::read_to_string(site.join("about/index.html")).unwrap();
    assert!(about.contains(r#"href="../index.html""#));
    assert!(about.contains(r#"src="../img/logo.png""#));

    // Every local link resolves to a written file
    for file in files_under(&site) {
        if file.extension().and_then(|e| e.to_str()) != Some("html") {
            continue;
        }
        let html = std::fs::read_to_string(site.join(&file)).unwrap();
        let dir = site.join(&file).parent().unwrap().to_path_buf();
        for link in local_links(&html) {
            assert!(
                dir.join(&link).exists(),
                "dangling link {} in {}",
                link,
                file.display()
            );
        }
    }

    // Image collection copies images flat next to the mirror
    let images = files_under(&out.path().join("127.0.0.1-images"));
    assert_eq!(images, flat_names(&base, &["/img/bg.png", "/img/logo.png"]));
}

#[tokio::test]
async fn test_page_ceiling() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/a">A</a><a href="/b">B</a><img src="/pic.png">"#.to_string(),
    )
    .await;
    mount_never(&server, "/a").await;
    mount_never(&server, "/b").await;
    mount_bytes(&server, "/pic.png", b"png", "image/png").await;

    let out = TempDir::new().unwrap();
    let mut config = test_config(&base, out.path());
    config.max_pages = 1;

    let (result, records, _) = finish(start(config).unwrap()).await;
    let report = result.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.stats.pages_fetched, 1);
    assert_eq!(report.stats.assets_fetched, 1);
    assert_eq!(report.frontier.not_fetched, 2);
    assert_eq!(report.frontier.pages_admitted, 1);
    assert_eq!(records.len(), 4);

    // Links to unfetched pages stay absolute
    assert_eq!(report.unresolved_references, 2);
    let index = std::fs::read_to_string(out.path().join("127.0.0.1/index.html")).unwrap();
    assert!(index.contains(&format!("{}/a", base)));
    assert!(index.contains(r#"src="pic.png""#));
}

#[tokio::test]
async fn test_missing_asset_counts_failure() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<img src="/img/missing.png"><img src="/img/ok.png">"#.to_string(),
    )
    .await;
    mount_bytes(&server, "/img/ok.png", b"png", "image/png").await;

    let out = TempDir::new().unwrap();
    let (result, records, lines) = finish(start(test_config(&base, out.path())).unwrap()).await;
    let report = result.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.stats.failures, 1);
    assert_eq!(report.frontier.failed, 1);
    assert!(records
        .iter()
        .any(|r| r.url.path() == "/img/missing.png" && r.failure.is_some()));
    assert!(lines.iter().any(|l| l.contains("[failed]")));
    assert!(!out.path().join("127.0.0.1/img/missing.png").exists());
    assert!(out.path().join("127.0.0.1/img/ok.png").exists());
}

#[tokio::test]
async fn test_images_only_flat_output() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_html(
        &server,
        "/",
        r#"<a href="/gallery">Gallery</a><img src="/img/a.png">
        <script src="/app.js"></script>"#
            .to_string(),
    )
    .await;
    mount_html(
        &server,
        "/gallery",
        r#"<img src="/thumbs/b.jpg"><img src="/thumbs/a.png">
        <div style="background-image: url('/img/c.gif')"></div>"#
            .to_string(),
    )
    .await;
    mount_never(&server, "/app.js").await;
    mount_bytes(&server, "/img/a.png", b"png", "image/png").await;
    mount_bytes(&server, "/thumbs/a.png", b"thumb png", "image/png").await;
    mount_bytes(&server, "/thumbs/b.jpg", b"jpg", "image/jpeg").await;
    mount_bytes(&server, "/img/c.gif", b"gif", "image/gif").await;

    // Each run writes into a fresh directory; same URLs must give the same names
    let mut file_sets = Vec::new();
    for _ in 0..2 {
        let out = TempDir::new().unwrap();
        let mut config = test_config(&base, out.path());
        config.mode = MirrorMode::Images;

        let (result, _, _) = finish(start(config).unwrap()).await;
        let report = result.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.stats.images_fetched, 4);
        assert_eq!(report.stats.failures, 0);
        assert_eq!(report.output_dir, out.path().join("127.0.0.1-images"));
        assert!(!out.path().join("127.0.0.1").exists());

        let files = files_under(&report.output_dir);
        let thumb = flat_image_name(&Url::parse(&format!("{}/thumbs/a.png", base)).unwrap(), None);
        let copied = std::fs::read(report.output_dir.join(thumb)).unwrap();
        assert_eq!(copied, b"thumb png");
        file_sets.push(files);
    }

    assert_eq!(
        file_sets[0],
        flat_names(&base, &["/img/a.png", "/thumbs/a.png", "/thumbs/b.jpg", "/img/c.gif"])
    );
    assert_eq!(file_sets[0], file_sets[1]);
}

#[tokio::test]
async fn test_cancellation_is_prompt() {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (0..40)
        .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
        .collect();
    mount_html(&server, "/", links).await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<p>slow</p>", "text/html")
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let mut config = test_config(&base, out.path());
    config.max_workers = 2;
    config.delay = Duration::from_millis(100);

    let handle = start(config).unwrap();
    let deadline = Instant::now() + Duration::from_secs(10);
    while handle.status().stats.pages_fetched < 2 {
        assert!(Instant::now() < deadline, "crawl made no progress");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let cancelled_at = Instant::now();
    handle.cancel();
    let (result, _, lines) = finish(handle).await;
    let report = result.unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(3));
    assert_eq!(report.state, RunState::Cancelled);
    assert!(report.stats.pages_fetched < 41);
    assert!(lines.iter().any(|l| l.contains("Cancellation requested")));

    // Only complete files remain
    let site = out.path().join("127.0.0.1");
    assert!(site.join("index.html").exists());
    assert!(files_under(&site)
        .iter()
        .all(|f| !f.to_string_lossy().ends_with(".part")));
}

#[tokio::test]
async fn test_unreachable_start_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let handle = start(test_config(&server.uri(), out.path())).unwrap();
    let lines = handle.stream_log().collect().await;
    assert_eq!(handle.state(), RunState::Failed);

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, MirrorError::UnreachableStart { .. }));
    assert!(lines.iter().any(|l| l.contains("[error]")));
    assert!(files_under(out.path()).is_empty());
}

#[tokio::test]
async fn test_log_stream_is_finite() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_html(&server, "/", "<p>only page</p>".to_string()).await;

    let out = TempDir::new().unwrap();
    let handle = start(test_config(&base, out.path())).unwrap();
    let mut stream = handle.stream_log();

    let mut lines = Vec::new();
    let collected = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(line) = stream.next().await {
            lines.push(line);
        }
    })
    .await;
    assert!(collected.is_ok(), "log stream did not end with the run");

    assert!(lines.first().unwrap().contains("Starting mirror"));
    assert!(lines.last().unwrap().contains("Run completed"));
    assert!(handle.is_finished());

    let status = handle.status();
    assert_eq!(status.state, RunState::Completed);
    assert!(!status.recent_log.is_empty());
    assert_eq!(handle.wait().await.unwrap().stats.pages_fetched, 1);
}
