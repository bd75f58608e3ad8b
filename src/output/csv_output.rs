//! CSV output handler
//!
//! Rows are appended to the file. The header is written only when the file is
//! new or empty, so a resumed run continues the table of the previous one.

use crate::crawler::ExtractedRecord;
use crate::output::traits::{OutputError, OutputHandler, OutputResult, OutputRow, OUTPUT_COLUMNS};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Writes output rows to a CSV file
pub struct CsvOutputHandler {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl CsvOutputHandler {
    /// Opens `path` for appending, truncating it first unless `append` is set
    ///
    /// # Arguments
    ///
    /// * `path` - Output file
    /// * `append` - Keep existing rows (resumed run)
    ///
    /// # Returns
    ///
    /// * `Ok(CsvOutputHandler)` - Ready to write; header already present
    /// * `Err(OutputError)` - The file could not be opened
    pub fn open(path: &Path, append: bool) -> OutputResult<Self> {
        let io_error = |source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_error)?;
        if !append {
            file.set_len(0).map_err(io_error)?;
        }
        let size = file.metadata().map_err(io_error)?.len();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if size == 0 {
            writer.write_record(OUTPUT_COLUMNS)?;
            writer.flush().map_err(io_error)?;
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputHandler for CsvOutputHandler {
    fn write_records(&mut self, records: &[ExtractedRecord]) -> OutputResult<usize> {
        for record in records {
            self.writer.serialize(OutputRow::from_record(record)?)?;
        }
        Ok(records.len())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush().map_err(|source| OutputError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|source| OutputError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
