//! Preview payloads for files appearing in the output directory
//!
//! A control panel polls [`PreviewScanner::scan`] to show newly written files
//! while the crawl is running. Images below [`PREVIEW_LIMIT`] carry their
//! bytes; everything else is reported as metadata only.

use crate::url::IMAGE_EXTENSIONS;
use mime::Mime;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Largest image inlined into a preview (exclusive)
pub const PREVIEW_LIMIT: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    File,
}

/// One file seen in the output directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewItem {
    pub kind: PreviewKind,
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub extension: String,
    pub mime_type: String,
    /// File contents, present only for images below the preview limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl PreviewItem {
    pub fn is_inlined(&self) -> bool {
        self.data.is_some()
    }
}

/// MIME type for a lowercase file extension
pub fn mime_for_extension(extension: &str) -> Mime {
    let essence = match extension {
        "png" => return mime::IMAGE_PNG,
        "jpg" | "jpeg" | "jfif" => return mime::IMAGE_JPEG,
        "gif" => return mime::IMAGE_GIF,
        "bmp" => return mime::IMAGE_BMP,
        "svg" => return mime::IMAGE_SVG,
        "html" | "htm" => return mime::TEXT_HTML,
        "css" => return mime::TEXT_CSS,
        "js" | "mjs" => return mime::TEXT_JAVASCRIPT,
        "json" => return mime::APPLICATION_JSON,
        "xml" => return mime::TEXT_XML,
        "txt" => return mime::TEXT_PLAIN,
        "pdf" => return mime::APPLICATION_PDF,
        "woff" => return mime::FONT_WOFF,
        "woff2" => return mime::FONT_WOFF2,
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    essence.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// Reports files under a directory that were not reported before
#[derive(Debug)]
pub struct PreviewScanner {
    root: PathBuf,
    known: HashSet<PathBuf>,
}

impl PreviewScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            known: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks the directory and returns files not returned by earlier scans
    ///
    /// Temporary `.part` files and other hidden files are skipped, so only
    /// complete files are ever reported. A missing root yields no items.
    pub async fn scan(&mut self) -> io::Result<Vec<PreviewItem>> {
        let mut items = Vec::new();
        let mut directories = vec![self.root.clone()];

        while let Some(directory) = directories.pop() {
            let mut entries = match fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }

                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    directories.push(path);
                    continue;
                }
                if !file_type.is_file() || self.known.contains(&path) {
                    continue;
                }

                let size = entry.metadata().await?.len();
                items.push(preview_item(path.clone(), name, size).await?);
                self.known.insert(path);
            }
        }

        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(items)
    }
}

async fn preview_item(path: PathBuf, name: String, size: u64) -> io::Result<PreviewItem> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let is_image = IMAGE_EXTENSIONS.contains(&extension.as_str());

    let data = if is_image && size < PREVIEW_LIMIT {
        Some(fs::read(&path).await?)
    } else {
        None
    };

    Ok(PreviewItem {
        kind: if is_image {
            PreviewKind::Image
        } else {
            PreviewKind::File
        },
        name,
        mime_type: mime_for_extension(&extension).essence_str().to_string(),
        extension,
        path,
        size,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_reports_new_files_once() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/a.png"), b"png").unwrap();
        std::fs::write(dir.path().join("index.html"), b"<p></p>").unwrap();
        std::fs::write(dir.path().join("img/.b.png.part"), b"partial").unwrap();

        let mut scanner = PreviewScanner::new(dir.path());
        let items = scanner.scan().await.unwrap();
        assert_eq!(items.len(), 2);

        let image = items.iter().find(|i| i.name == "a.png").unwrap();
        assert_eq!(image.kind, PreviewKind::Image);
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data.as_deref(), Some(&b"png"[..]));

        let page = items.iter().find(|i| i.name == "index.html").unwrap();
        assert_eq!(page.kind, PreviewKind::File);
        assert!(!page.is_inlined());

        assert!(scanner.scan().await.unwrap().is_empty());

        std::fs::write(dir.path().join("img/c.gif"), b"gif").unwrap();
        let items = scanner.scan().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "c.gif");
    }

    #[tokio::test]
    async fn test_large_images_are_metadata_only() {
        let dir = TempDir::new().unwrap();
        let big = vec![0u8; PREVIEW_LIMIT as usize];
        std::fs::write(dir.path().join("big.jpg"), &big).unwrap();

        let items = PreviewScanner::new(dir.path()).scan().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].size, PREVIEW_LIMIT);
        assert_eq!(items[0].kind, PreviewKind::Image);
        assert!(items[0].data.is_none());
    }

    #[tokio::test]
    async fn test_missing_root() {
        let mut scanner = PreviewScanner::new("/nonexistent/preview/root");
        assert!(scanner.scan().await.unwrap().is_empty());
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("jpeg"), mime::IMAGE_JPEG);
        assert_eq!(mime_for_extension("svg").essence_str(), "image/svg+xml");
        assert_eq!(mime_for_extension("webp").essence_str(), "image/webp");
        assert_eq!(mime_for_extension("unknown"), mime::APPLICATION_OCTET_STREAM);
    }
}
