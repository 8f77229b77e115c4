//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlStatus`: Tracks the state of individual URLs (pending, in flight, done, ...)
//! - `RunState`: Tracks the lifecycle of a whole crawl run

mod run_state;
mod url_status;

pub use run_state::{AtomicRunState, RunState};
pub use url_status::UrlStatus;
