use mime::Mime;
use serde::Serialize;
use url::Url;

/// Extensions treated as images
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tiff", "tif", "avif", "jfif",
];

const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "eot", "otf"];

const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mp3", "wav", "avi", "mov", "m4a"];

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "gz", "tar", "rar", "7z", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "csv",
    "txt", "xml", "json", "map", "webmanifest",
];

/// Kind of non-page resource, inferred from a URL path or a content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Stylesheet,
    Script,
    Font,
    Media,
    Document,
}

impl AssetKind {
    /// Infers the asset kind from the file extension of a URL path
    pub fn from_url(url: &Url) -> Option<Self> {
        Self::from_extension(&path_extension(url.path())?)
    }

    /// Infers the asset kind from a lowercase extension without the dot
    pub fn from_extension(ext: &str) -> Option<Self> {
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if ext == "css" {
            Some(Self::Stylesheet)
        } else if ext == "js" || ext == "mjs" {
            Some(Self::Script)
        } else if FONT_EXTENSIONS.contains(&ext) {
            Some(Self::Font)
        } else if MEDIA_EXTENSIONS.contains(&ext) {
            Some(Self::Media)
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Some(Self::Document)
        } else {
            None
        }
    }

    /// Infers the asset kind from a parsed Content-Type
    ///
    /// HTML has no asset kind; any other type that is not recognized is a
    /// plain document.
    pub fn from_mime(mime: &Mime) -> Option<Self> {
        let type_ = mime.type_();
        let subtype = mime.subtype().as_str();

        if type_ == mime::IMAGE {
            Some(Self::Image)
        } else if type_ == mime::TEXT && mime.subtype() == mime::CSS {
            Some(Self::Stylesheet)
        } else if subtype.ends_with("javascript") || subtype.ends_with("ecmascript") {
            Some(Self::Script)
        } else if type_ == mime::FONT || subtype.starts_with("font-") || subtype.starts_with("x-font-") {
            Some(Self::Font)
        } else if type_ == mime::VIDEO || type_ == mime::AUDIO {
            Some(Self::Media)
        } else if is_html_mime(mime) {
            None
        } else {
            Some(Self::Document)
        }
    }
}

/// Returns the lowercase extension of the last path segment, if any
pub fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Returns true when the URL path carries an image extension
pub fn is_image_url(url: &Url) -> bool {
    AssetKind::from_url(url) == Some(AssetKind::Image)
}

/// Parses a Content-Type header value; malformed or empty values yield `None`
pub fn parse_content_type(value: &str) -> Option<Mime> {
    value.trim().parse::<Mime>().ok()
}

/// Returns true for `text/html` and `application/xhtml+xml`
pub fn is_html_mime(mime: &Mime) -> bool {
    (mime.type_() == mime::TEXT && mime.subtype() == mime::HTML)
        || (mime.type_() == mime::APPLICATION && mime.subtype().as_str() == "xhtml")
}
