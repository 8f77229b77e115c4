//! Mirror module: local persistence of fetched content
//!
//! # Components
//!
//! - `paths`: URL to local path mapping, flat image names, relative links
//! - `rewrite`: reference rewriting inside HTML and CSS
//! - `writer`: atomic writes, the pending list and the post-crawl rewrite pass

pub mod paths;
pub mod rewrite;
pub mod writer;

pub use paths::{flat_image_name, images_root, mirror_path, relative_link, site_root, PathMap};
pub use rewrite::{rewrite_css, rewrite_html, LinkTarget, Rewritten};
pub use writer::{
    is_image_document, write_atomic, DocumentKind, FinishReport, MirrorWriter, WriteError,
    WriteReport,
};
