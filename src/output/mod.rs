//! Output module for persisting harvested records and reporting on runs
//!
//! This module handles:
//! - Writing the output table as CSV or SQLite
//! - Choosing the format from the output file extension
//! - Run summaries and resource sampling

mod csv_output;
mod sqlite_output;
pub mod stats;
mod traits;

pub use csv_output::CsvOutputHandler;
pub use sqlite_output::SqliteOutputHandler;
pub use stats::{log_summary, print_statistics, ResourceMonitor, ResourceSample};
pub use traits::{OutputError, OutputHandler, OutputResult, OutputRow, OUTPUT_COLUMNS};

use std::path::Path;

/// Storage format of the output table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Sqlite,
}

impl OutputFormat {
    /// Picks the format from the file extension (`.db`/`.sqlite` mean SQLite)
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("db") | Some("sqlite") | Some("sqlite3") => Self::Sqlite,
            _ => Self::Csv,
        }
    }
}

/// Opens the output handler for `path`
///
/// # Arguments
///
/// * `path` - Output file; its extension selects the format
/// * `append` - Keep rows from a previous run (resuming)
///
/// # Returns
///
/// * `Ok(Box<dyn OutputHandler>)` - Ready to receive records
/// * `Err(OutputError)` - The file could not be opened or created
pub fn open_output(path: &Path, append: bool) -> OutputResult<Box<dyn OutputHandler>> {
    let handler: Box<dyn OutputHandler> = match OutputFormat::from_path(path) {
        OutputFormat::Csv => Box::new(CsvOutputHandler::open(path, append)?),
        OutputFormat::Sqlite => Box::new(SqliteOutputHandler::open(path, append)?),
    };
    tracing::debug!(path = %path.display(), append, "Opened output");
    Ok(handler)
}
