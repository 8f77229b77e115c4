//! Local path mapping for mirrored URLs
//!
//! Mirror layout, relative to `{output_dir}/{domain}/`:
//!
//! | URL | Local path |
//! |-----|-----------|
//! | `https://example.com/` (HTML) | `index.html` |
//! | `https://example.com/about` (HTML) | `about/index.html` |
//! | `https://example.com/list.php` (HTML) | `list.php.html` |
//! | `https://example.com/list?page=2` (HTML) | `list/index__q{hash}.html` |
//! | `https://example.com/css/site.css` | `css/site.css` |
//! | `https://cdn.example.com/a.png` (alias) | `_hosts/cdn.example.com/a.png` |
//! | `https://example.com/Logo.PNG` | `Logo~{hash}.PNG` |
//!
//! Every path is a function of the URL alone. Where the mapping loses
//! information another URL could share (letter case, replaced characters, an
//! added extension, a literal `index.html`), the file name carries
//! `~{hash of the URL}`, so the same URLs get the same names on every run no
//! matter which worker finishes first.
//!
//! Images-only runs use a flat `{output_dir}/{domain}-images/` directory with
//! names of the form `{basename}~{hash of the URL}.{ext}`.

use crate::url::{path_extension, site_dir_name};
use mime::Mime;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Characters escaped when a local path is written back into a link
const LINK_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'(')
    .add(b')');

/// Longest file name stem kept before it is shortened with a hash
const MAX_STEM_LEN: usize = 120;

/// Directory holding in-scope hosts other than the start host
const HOSTS_DIR: &str = "_hosts";

/// First 8 hex characters of the SHA-256 of `input`
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(8);
    hex
}

/// Directory holding a full mirror of the site rooted at `start`
pub fn site_root(output_dir: &Path, start: &Url) -> PathBuf {
    output_dir.join(site_dir_name(start).unwrap_or_else(|| "site".to_string()))
}

/// Flat directory holding the images of the site rooted at `start`
pub fn images_root(output_dir: &Path, start: &Url) -> PathBuf {
    let domain = site_dir_name(start).unwrap_or_else(|| "site".to_string());
    output_dir.join(format!("{}-images", domain))
}

/// File extension for a Content-Type, if it names a well-known format
pub fn extension_for_mime(mime: &Mime) -> Option<&'static str> {
    let ext = match mime.essence_str() {
        "text/html" | "application/xhtml+xml" => "html",
        "text/css" => "css",
        "text/javascript" | "application/javascript" | "application/x-javascript" => "js",
        "application/json" | "application/manifest+json" => "json",
        "application/xml" | "text/xml" => "xml",
        "text/plain" => "txt",
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "image/bmp" => "bmp",
        "image/tiff" => "tiff",
        "image/avif" => "avif",
        "font/woff" | "application/font-woff" => "woff",
        "font/woff2" => "woff2",
        "font/ttf" | "application/x-font-ttf" => "ttf",
        "font/otf" => "otf",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        _ => return None,
    };
    Some(ext)
}

/// Decodes one URL path segment into a safe file name component
///
/// Percent-escapes are decoded; path separators, `<>:"|?*` and control
/// characters become `_`; `.` and `..` cannot survive as components.
pub fn sanitize_segment(segment: &str) -> String {
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let cleaned: String = decoded
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" => String::new(),
        "." | ".." => "_".repeat(cleaned.len()),
        _ => shorten(cleaned),
    }
}

fn shorten(name: String) -> String {
    let (stem, ext) = split_extension(&name);
    if stem.len() <= MAX_STEM_LEN {
        return name;
    }
    let mut cut = MAX_STEM_LEN;
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}~{}{}", &stem[..cut], short_hash(stem), ext)
}

/// Splits `name` into stem and extension (the extension keeps its dot)
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => name.split_at(i),
        _ => (name, ""),
    }
}

/// Inserts `suffix` before the extension of the last component of `path`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension(&name);
    path.with_file_name(format!("{}{}{}", stem, suffix, ext))
}

/// Decoded, sanitized path segments, and whether any of them lost information
fn local_segments(url: &Url) -> (Vec<String>, bool) {
    let mut segments = Vec::new();
    let mut lossy = false;

    for raw in url.path_segments().into_iter().flatten().filter(|s| !s.is_empty()) {
        let decoded = percent_decode_str(raw).decode_utf8_lossy();
        let local = sanitize_segment(raw);
        lossy |= local != decoded || local.to_lowercase() != local || ambiguous_escapes(raw);
        segments.push(local);
    }

    (segments, lossy)
}

/// True when a segment's escapes decode to text another spelling shares
///
/// `%41` and `A` are different URLs with the same decoded name, as are two
/// invalid UTF-8 sequences that both decode to U+FFFD.
fn ambiguous_escapes(raw: &str) -> bool {
    if percent_decode_str(raw).decode_utf8().is_err() {
        return true;
    }
    raw.as_bytes()
        .windows(3)
        .filter(|w| w[0] == b'%')
        .filter_map(|w| {
            std::str::from_utf8(&w[1..])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        })
        .any(|b| b.is_ascii_alphanumeric() || b"-._~".contains(&b))
}

/// True for literal file names that the mapping also generates for other URLs
///
/// Extensionless pages become `{name}/index.html` and pages such as
/// `list.php` become `list.php.html`; URLs spelling those names out lose.
fn shadows_generated_name(name: &str) -> bool {
    let (stem, ext) = split_extension(name);
    if !ext.eq_ignore_ascii_case(".html") {
        return false;
    }
    stem.eq_ignore_ascii_case("index")
        || path_extension(stem).is_some_and(|e| e != "html" && e != "htm")
}

/// Computes the mirror path of `url`, relative to the site root
///
/// # Arguments
///
/// * `url` - The canonical URL
/// * `site_host` - The start host; other hosts are stored under `_hosts/`
/// * `is_html` - Whether the response is an HTML document
/// * `content_type` - Used to name extensionless asset URLs
pub fn mirror_path(
    url: &Url,
    site_host: &str,
    is_html: bool,
    content_type: Option<&Mime>,
) -> PathBuf {
    let mut path = PathBuf::new();

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let off_site = host != site_host;
    if off_site {
        path.push(HOSTS_DIR);
        path.push(sanitize_segment(&host));
    }

    let directory_like = url.path().ends_with('/');
    let (mut segments, mut lossy) = local_segments(url);
    if !off_site && segments.first().is_some_and(|s| s.eq_ignore_ascii_case(HOSTS_DIR)) {
        lossy = true;
    }
    let last = if directory_like { None } else { segments.pop() };
    for segment in &segments {
        path.push(segment);
    }

    let file_name = if is_html {
        match last {
            None => "index.html".to_string(),
            Some(name) => match path_extension(&name).as_deref() {
                None => {
                    path.push(&name);
                    "index.html".to_string()
                }
                Some("html") | Some("htm") => {
                    lossy |= shadows_generated_name(&name);
                    name
                }
                Some(_) => format!("{}.html", name),
            },
        }
    } else {
        let ext = content_type.and_then(extension_for_mime);
        match (last, ext) {
            (None, ext) => {
                lossy = true;
                match ext {
                    Some(ext) => format!("index.{}", ext),
                    None => "index".to_string(),
                }
            }
            (Some(name), Some(ext)) if path_extension(&name).is_none() => {
                lossy = true;
                format!("{}.{}", name, ext)
            }
            (Some(name), _) => {
                lossy |= shadows_generated_name(&name);
                name
            }
        }
    };
    path.push(file_name);

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        path = with_suffix(&path, &format!("__q{}", short_hash(query)));
    }
    if lossy {
        path = with_suffix(&path, &format!("~{}", short_hash(url.as_str())));
    }
    path
}

/// File name of an image in the flat images directory
///
/// `{basename}~{hash of the URL}.{ext}`; the extension comes from the
/// Content-Type when the basename has none, and URLs without a usable
/// basename become `image_{hash}.{ext}`. The hash keeps images that share a
/// basename apart regardless of which one is written first.
pub fn flat_image_name(url: &Url, content_type: Option<&Mime>) -> String {
    let hash = short_hash(url.as_str());
    let fallback_ext = content_type.and_then(extension_for_mime).unwrap_or("jpg");
    let basename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(sanitize_segment)
        .filter(|name| !name.is_empty() && !name.starts_with('.'));

    match basename {
        Some(name) => {
            let name = if path_extension(&name).is_some() {
                name
            } else {
                format!("{}.{}", name, fallback_ext)
            };
            let (stem, ext) = split_extension(&name);
            format!("{}~{}{}", stem, hash, ext)
        }
        None => format!("image_{}.{}", hash, fallback_ext),
    }
}

/// Relative link from the file `from` to the file `to`
///
/// Both paths are relative to the same root. Each component is
/// percent-encoded so the result can be written into an attribute.
pub fn relative_link(from: &Path, to: &Path) -> String {
    let from_dir: Vec<Component<'_>> = from
        .parent()
        .map(|p| p.components().collect())
        .unwrap_or_default();
    let target: Vec<Component<'_>> = to.components().collect();

    let common = from_dir
        .iter()
        .zip(target.iter().take(target.len().saturating_sub(1)))
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = std::iter::repeat("..".to_string())
        .take(from_dir.len() - common)
        .collect();
    parts.extend(target[common..].iter().map(|component| {
        utf8_percent_encode(&component.as_os_str().to_string_lossy(), LINK_SEGMENT).to_string()
    }));
    parts.join("/")
}

/// Immutable URL to local path assignments for one run
///
/// Once a URL has a path it keeps it. Candidates from [`mirror_path`] and
/// [`flat_image_name`] already differ wherever two URLs could share a name,
/// so a candidate another URL holds (compared case-insensitively) means the
/// two URL hashes agree; the later URL then gets a counter suffix.
#[derive(Debug, Default)]
pub struct PathMap {
    by_url: HashMap<String, PathBuf>,
    owners: HashMap<String, String>,
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&PathBuf> {
        self.by_url.get(url)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// Returns the path for `url`, assigning `candidate` (or a collision-free variant) on first use
    pub fn assign(&mut self, url: &str, candidate: PathBuf) -> PathBuf {
        if let Some(existing) = self.by_url.get(url) {
            return existing.clone();
        }

        let mut path = candidate.clone();
        let mut attempt = 1;
        while self.owners.contains_key(&collision_key(&path)) {
            attempt += 1;
            path = with_suffix(&candidate, &format!("-{}", attempt));
        }

        self.owners.insert(collision_key(&path), url.to_string());
        self.by_url.insert(url.to_string(), path.clone());
        path
    }
}

fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}
