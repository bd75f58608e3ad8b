//! Configuration module for Page-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every option has a built-in default, so a missing file is not an error.
//!
//! # Example
//!
//! ```no_run
//! use page_harvest::config::load_or_default;
//! use std::path::Path;
//!
//! let (config, _) = load_or_default(Path::new("scraper_config.toml")).unwrap();
//! println!("Fetching {} pages at a time", config.scraper.batch_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, OutputConfig, ScraperConfig, DEFAULT_USER_AGENT};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_or_default, parse_config, write_config};

// Re-export validation
pub use validation::validate;
