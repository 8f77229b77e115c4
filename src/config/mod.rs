//! Configuration module for Sumi-Mirror
//!
//! This module handles loading, parsing, and validating the `key = value`
//! configuration file shared with the control panel.
//!
//! # Example
//!
//! ```no_run
//! use sumi_mirror::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.txt")).unwrap();
//! println!("Mirroring {} with {} workers", config.start_url, config.max_workers);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{Config, MirrorMode, DEFAULT_USER_AGENT};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
