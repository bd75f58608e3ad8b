//! Output handler traits and types
//!
//! This module defines the trait interface for output handlers and the row
//! layout every handler writes.

use crate::crawler::ExtractedRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Column names of the output table, in order
pub const OUTPUT_COLUMNS: [&str; 5] = ["identifier", "content", "metadata", "error", "size_bytes"];

/// One row of the output table
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputRow {
    pub identifier: String,
    pub content: String,

    /// Page metadata as a JSON object
    pub metadata: String,

    /// Error label, empty for a successful item
    pub error: String,

    pub size_bytes: u64,
}

impl OutputRow {
    /// Flattens an extracted record into a row
    pub fn from_record(record: &ExtractedRecord) -> OutputResult<Self> {
        Ok(Self {
            identifier: record.identifier.clone(),
            content: record.content.clone(),
            metadata: serde_json::to_string(&record.metadata)?,
            error: record.error.map(|e| e.to_string()).unwrap_or_default(),
            size_bytes: record.size_bytes,
        })
    }
}

/// Trait for output handlers
///
/// Handlers receive the records of a run in input order and persist them as
/// table rows. Writes arrive one batch at a time, each followed by `flush`.
pub trait OutputHandler {
    /// Writes the given records, returning how many rows were written
    fn write_records(&mut self, records: &[ExtractedRecord]) -> OutputResult<usize>;

    /// Flushes everything written so far to durable storage
    fn flush(&mut self) -> OutputResult<()>;
}
