//! Mirror writer: persists fetched documents and rewrites their references
//!
//! This module handles:
//! - Assigning each URL an immutable local path (see [`super::paths`])
//! - Atomic per-file writes (temporary file in the same directory, then rename)
//! - First-pass rewriting of HTML and CSS at write time
//! - Tracking documents that still point at not-yet-written targets
//! - The post-crawl pass that rewrites those remaining references
//!
//! A reference becomes a relative local link only once its target file has
//! been written, so a rewritten link never dangles.

use super::paths::{
    flat_image_name, images_root, mirror_path, relative_link, site_root, PathMap,
};
use super::rewrite::{rewrite_css, rewrite_html, LinkTarget, Rewritten};
use crate::config::Config;
use crate::crawler::extractor::resolve_reference;
use crate::crawler::fetcher::FetchedDocument;
use crate::url::{canonicalize, is_image_url, AssetKind, LinkHint, Scope};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tokio::fs;
use url::Url;

/// Per-file write failure; counted and logged, never fatal to the run
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is already a directory")]
    Collision { path: PathBuf },

    #[error("{url} is not an image (content type {content_type:?})")]
    NotImage { url: String, content_type: String },
}

impl WriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How a fetched body is treated when written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Rewritten as HTML
    Html,
    /// Rewritten as CSS
    Css,
    /// Written byte-for-byte
    Other,
}

impl DocumentKind {
    /// Decides from the Content-Type, falling back to the URL extension
    pub fn of(document: &FetchedDocument) -> Self {
        if document.is_html() {
            return Self::Html;
        }
        match &document.content_type {
            Some(mime) => match AssetKind::from_mime(mime) {
                Some(AssetKind::Stylesheet) => Self::Css,
                _ => Self::Other,
            },
            None => match AssetKind::from_url(&document.url) {
                Some(AssetKind::Stylesheet) => Self::Css,
                _ => Self::Other,
            },
        }
    }
}

/// Returns true if the document is an image by Content-Type or, lacking a usable one, by extension
pub fn is_image_document(document: &FetchedDocument) -> bool {
    let kind = document.content_type.as_ref().and_then(AssetKind::from_mime);
    match kind {
        Some(AssetKind::Image) => true,
        Some(AssetKind::Document) | None => {
            !document.is_html() && is_image_url(&document.url)
        }
        Some(_) => false,
    }
}

/// What one successful write produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// The file written
    pub path: PathBuf,

    /// Bytes written, including any flat image copy
    pub bytes: u64,

    /// The flat images-directory copy, when image collection is on
    pub image_copy: Option<PathBuf>,

    /// References left pointing at absolute URLs of in-scope targets
    pub unresolved: usize,
}

/// Outcome of the post-crawl rewrite pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishReport {
    /// Documents whose content changed and were rewritten
    pub rewritten: usize,

    /// References still unresolved after the pass (targets never written)
    pub unresolved: usize,

    /// Documents that could not be re-read or re-written
    pub failed: usize,
}

#[derive(Debug, Clone)]
struct PendingDocument {
    url: Url,
    local: PathBuf,
    kind: DocumentKind,
}

#[derive(Debug, Default)]
struct LocalFiles {
    paths: PathMap,
    written: HashSet<String>,
}

impl LocalFiles {
    fn written_path(&self, url: &str) -> Option<&PathBuf> {
        if self.written.contains(url) {
            self.paths.get(url)
        } else {
            None
        }
    }
}

/// Writes the output of one crawl run
#[derive(Debug)]
pub struct MirrorWriter {
    site_root: PathBuf,
    images_root: PathBuf,
    site_host: String,
    scope: Scope,
    collect_images: bool,
    files: Mutex<LocalFiles>,
    images: Mutex<PathMap>,
    pending: Mutex<Vec<PendingDocument>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MirrorWriter {
    /// Creates a writer for the run rooted at `start`
    pub fn new(config: &Config, start: &Url, scope: Scope) -> Self {
        Self {
            site_root: site_root(&config.output_dir, start),
            images_root: images_root(&config.output_dir, start),
            site_host: scope.start_host().to_string(),
            scope,
            collect_images: config.collect_images,
            files: Mutex::new(LocalFiles::default()),
            images: Mutex::new(PathMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// `{output_dir}/{domain}`
    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    /// `{output_dir}/{domain}-images`
    pub fn images_root(&self) -> &Path {
        &self.images_root
    }

    /// Local path of a written URL, relative to the site root
    pub fn local_path(&self, url: &Url) -> Option<PathBuf> {
        lock(&self.files).written_path(url.as_str()).cloned()
    }

    /// Number of documents waiting for the post-crawl pass
    pub fn pending_documents(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Writes a document into the mirror tree, rewriting HTML and CSS references
    ///
    /// # Arguments
    ///
    /// * `document` - The fetched document; its canonical `url` keys the path map
    /// * `kind` - How to treat the body
    /// * `base` - Base for relative references (final URL or `<base href>`)
    pub async fn write_mirror(
        &self,
        document: &FetchedDocument,
        kind: DocumentKind,
        base: &Url,
    ) -> Result<WriteReport, WriteError> {
        let key = document.url.as_str().to_string();
        let relative = {
            let candidate = mirror_path(
                &document.url,
                &self.site_host,
                kind == DocumentKind::Html,
                document.content_type.as_ref(),
            );
            lock(&self.files).paths.assign(&key, candidate)
        };

        let (body, unresolved) = match kind {
            DocumentKind::Other => (document.body.clone(), 0),
            DocumentKind::Html | DocumentKind::Css => {
                let text = String::from_utf8_lossy(&document.body);
                let resolve = |raw: &str| self.target_for(&relative, raw, base, false);
                let Rewritten { text, unresolved } = if kind == DocumentKind::Html {
                    rewrite_html(&text, resolve)
                } else {
                    rewrite_css(&text, resolve)
                };
                (text.into_bytes(), unresolved)
            }
        };

        let path = self.site_root.join(&relative);
        write_atomic(&path, &body).await?;
        lock(&self.files).written.insert(key);

        if unresolved > 0 {
            lock(&self.pending).push(PendingDocument {
                url: document.url.clone(),
                local: relative.clone(),
                kind,
            });
        }

        let mut bytes = body.len() as u64;
        let mut image_copy = None;
        if self.collect_images && is_image_document(document) {
            let copy = self.write_flat_image(document).await?;
            bytes += document.body.len() as u64;
            image_copy = Some(copy);
        }

        tracing::debug!("Wrote {} -> {}", document.url, path.display());
        Ok(WriteReport {
            path,
            bytes,
            image_copy,
            unresolved,
        })
    }

    /// Writes an image into the flat images directory (images-only mode)
    ///
    /// # Returns
    ///
    /// * `Ok(WriteReport)` - The image file written
    /// * `Err(WriteError::NotImage)` - The response was not an image
    pub async fn write_image(&self, document: &FetchedDocument) -> Result<WriteReport, WriteError> {
        if !is_image_document(document) {
            return Err(WriteError::NotImage {
                url: document.url.to_string(),
                content_type: document.essence().to_string(),
            });
        }

        let path = self.write_flat_image(document).await?;
        tracing::debug!("Wrote image {} -> {}", document.url, path.display());
        Ok(WriteReport {
            path,
            bytes: document.body.len() as u64,
            image_copy: None,
            unresolved: 0,
        })
    }

    async fn write_flat_image(&self, document: &FetchedDocument) -> Result<PathBuf, WriteError> {
        let name = {
            let name = flat_image_name(&document.url, document.content_type.as_ref());
            let candidate = PathBuf::from(name);
            lock(&self.images).assign(document.url.as_str(), candidate)
        };
        let path = self.images_root.join(name);
        write_atomic(&path, &document.body).await?;
        Ok(path)
    }

    /// Rewrites references that were still pending when their documents were written
    ///
    /// Runs after the crawl ends, including after cancellation. Only absolute
    /// http(s) values are reconsidered; relative links written by the first
    /// pass already point at local files.
    pub async fn finish(&self) -> FinishReport {
        let pending = std::mem::take(&mut *lock(&self.pending));
        let mut report = FinishReport::default();

        for document in pending {
            let path = self.site_root.join(&document.local);
            let text = match fs::read(&path).await {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(e) => {
                    tracing::warn!("Cannot re-read {} for rewriting: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let resolve = |raw: &str| self.target_for(&document.local, raw, &document.url, true);
            let rewritten = match document.kind {
                DocumentKind::Html => rewrite_html(&text, resolve),
                DocumentKind::Css => rewrite_css(&text, resolve),
                DocumentKind::Other => continue,
            };
            report.unresolved += rewritten.unresolved;

            if rewritten.text == text {
                continue;
            }
            match write_atomic(&path, rewritten.text.as_bytes()).await {
                Ok(()) => report.rewritten += 1,
                Err(e) => {
                    tracing::warn!("Post-crawl rewrite of {} failed: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Decides what a raw reference inside the document at `from` becomes
    fn target_for(&self, from: &Path, raw: &str, base: &Url, absolute_only: bool) -> LinkTarget {
        let trimmed = raw.trim();
        if absolute_only && !is_absolute_reference(trimmed) {
            return LinkTarget::Keep;
        }

        let Some(resolved) = resolve_reference(trimmed, base) else {
            return LinkTarget::Keep;
        };
        let fragment = resolved.fragment().map(str::to_string);
        let Ok(canonical) = canonicalize(resolved.clone()) else {
            return LinkTarget::Keep;
        };

        if let Some(target) = lock(&self.files).written_path(canonical.as_str()) {
            let mut link = relative_link(from, target);
            if let Some(fragment) = fragment {
                link.push('#');
                link.push_str(&fragment);
            }
            return LinkTarget::Local(link);
        }

        if self
            .scope
            .class_of(&canonical, LinkHint::Navigation)
            .is_fetchable()
        {
            LinkTarget::Pending(resolved.to_string())
        } else {
            LinkTarget::Remote(resolved.to_string())
        }
    }
}

fn is_absolute_reference(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

/// Writes `bytes` to `path` so the file is either complete or absent
///
/// The data goes to `.{name}.part` next to the target and is renamed into
/// place; a failed write removes the temporary file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .map_err(|e| WriteError::io(parent, e))?;

    if let Ok(metadata) = fs::metadata(path).await {
        if metadata.is_dir() {
            return Err(WriteError::Collision {
                path: path.to_path_buf(),
            });
        }
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.part", file_name));

    if let Err(e) = fs::write(&temp, bytes).await {
        let _ = fs::remove_file(&temp).await;
        return Err(WriteError::io(&temp, e));
    }
    if let Err(e) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(WriteError::io(path, e));
    }
    Ok(())
}
