//! Page-Harvest: a resumable content ingestion pipeline
//!
//! This crate fetches a list of web pages under a rate limit, extracts their
//! structured text, and checkpoints its progress so an interrupted run can
//! pick up where it stopped.

pub mod config;
pub mod crawler;
pub mod output;
pub mod shutdown;
pub mod source;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Page-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Item source error: {0}")]
    Source(#[from] source::SourceError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] storage::CheckpointError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid shutdown transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: shutdown::ShutdownState,
        to: shutdown::ShutdownState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Page-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{ExtractedRecord, Pipeline, RunOutcome};
pub use state::{ErrorKind, SharedStatistics, Statistics};
