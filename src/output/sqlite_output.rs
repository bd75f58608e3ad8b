//! SQLite output handler
//!
//! Rows go into a single `records` table keyed by identifier. Writing the
//! same identifier again (a resumed run re-fetching an item whose result was
//! never checkpointed) replaces the row in place, keeping its original
//! position.

use crate::crawler::ExtractedRecord;
use crate::output::traits::{OutputHandler, OutputResult, OutputRow};
use rusqlite::{params, Connection};
use std::path::Path;

/// SQL schema for the output database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL UNIQUE,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL,
    error TEXT,
    size_bytes INTEGER NOT NULL,
    written_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_error ON records(error);
"#;

/// Writes output rows to a SQLite database
pub struct SqliteOutputHandler {
    conn: Connection,
}

impl SqliteOutputHandler {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Database file
    /// * `append` - Keep existing rows (resumed run); otherwise the table is emptied
    pub fn open(path: &Path, append: bool) -> OutputResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Self::initialize(conn, append)
    }

    /// Creates an in-memory database (for testing)
    pub fn open_in_memory() -> OutputResult<Self> {
        Self::initialize(Connection::open_in_memory()?, false)
    }

    fn initialize(conn: Connection, append: bool) -> OutputResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        if !append {
            conn.execute("DELETE FROM records", [])?;
        }
        Ok(Self { conn })
    }

    /// Number of rows in the table
    pub fn count(&self) -> OutputResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// All rows in insertion order
    pub fn rows(&self) -> OutputResult<Vec<OutputRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT identifier, content, metadata, error, size_bytes FROM records ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(OutputRow {
                    identifier: row.get(0)?,
                    content: row.get(1)?,
                    metadata: row.get(2)?,
                    error: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    size_bytes: row.get::<_, i64>(4)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl OutputHandler for SqliteOutputHandler {
    fn write_records(&mut self, records: &[ExtractedRecord]) -> OutputResult<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (identifier, content, metadata, error, size_bytes, written_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(identifier) DO UPDATE SET
                    content = excluded.content,
                    metadata = excluded.metadata,
                    error = excluded.error,
                    size_bytes = excluded.size_bytes,
                    written_at = excluded.written_at",
            )?;

            for record in records {
                let row = OutputRow::from_record(record)?;
                let error = (!row.error.is_empty()).then_some(row.error);
                stmt.execute(params![
                    row.identifier,
                    row.content,
                    row.metadata,
                    error,
                    row.size_bytes as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}
