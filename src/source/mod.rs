//! Item source
//!
//! Reads the list of pages to harvest from a CSV file with a header row. The
//! URL column is matched case-insensitively. Blank cells are skipped, and so
//! are values that are not absolute http(s) URLs, with a warning.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Header of the column holding the item identifiers
pub const URL_COLUMN: &str = "URL";

/// Errors that can occur while reading the item list
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("No {column} column in the input header")]
    MissingColumn { column: &'static str },
}

/// Reads item identifiers from a CSV file
///
/// # Arguments
///
/// * `path` - CSV file with a `URL` column
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Identifiers in file order
/// * `Err(SourceError)` - The file is unreadable or has no `URL` column
pub fn read_items(path: &Path) -> Result<Vec<String>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let items = read_items_from(file)?;

    tracing::info!(path = %path.display(), count = items.len(), "Loaded items");
    Ok(items)
}

/// Reads item identifiers from any CSV reader
pub fn read_items_from<R: Read>(reader: R) -> Result<Vec<String>, SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let column = reader
        .headers()?
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(URL_COLUMN))
        .ok_or(SourceError::MissingColumn { column: URL_COLUMN })?;

    let mut items = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let value = record.get(column).unwrap_or("").trim();
        if value.is_empty() {
            continue;
        }

        if is_fetchable(value) {
            items.push(value.to_string());
        } else {
            // Row numbers are 1-based and count the header
            tracing::warn!(row = index + 2, value, "Skipping row without a valid URL");
        }
    }

    Ok(items)
}

/// Returns true for absolute http(s) URLs with a host
fn is_fetchable(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}
