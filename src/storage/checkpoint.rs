//! Durable checkpoints of harvest progress
//!
//! A checkpoint is a single JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "config_hash": "…",
//!   "checksum": "<sha256 of the canonical statistics JSON>",
//!   "statistics": { … }
//! }
//! ```
//!
//! Writes go to a sibling `.tmp` file which is synced and then renamed over the
//! real path, so a crash mid-write leaves the previous checkpoint intact.

use crate::state::{SharedStatistics, Statistics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Version written into every checkpoint; other versions are not loaded
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Errors that can occur while persisting a checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// A validated checkpoint read back from disk
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub statistics: Statistics,
    pub timestamp: DateTime<Utc>,
    pub config_hash: Option<String>,
}

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    version: u32,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    config_hash: Option<String>,
    checksum: String,
    statistics: serde_json::Value,
}

/// Saves and restores harvest progress
///
/// Saves are serialized through an async lock, and each save takes its
/// snapshot while holding that lock, so the file on disk always reflects the
/// most recent snapshot. The lock is only held for the duration of one write.
#[derive(Debug)]
pub struct CheckpointManager {
    path: PathBuf,
    config_hash: Option<String>,
    write_lock: Mutex<()>,
}

impl CheckpointManager {
    /// Creates a manager for the checkpoint at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config_hash: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Records the configuration fingerprint in every checkpoint
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Path of the checkpoint file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshots the shared statistics and persists them
    ///
    /// Returns the snapshot that was written.
    pub async fn save(&self, statistics: &SharedStatistics) -> CheckpointResult<Statistics> {
        let _guard = self.write_lock.lock().await;
        self.save_locked(statistics).await
    }

    /// Periodic save that yields to a shutdown checkpoint
    ///
    /// `cancel` is checked after the write lock is taken, so once shutdown has
    /// been requested no periodic save can land after the forced one.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Statistics))` - The snapshot that was written
    /// * `Ok(None)` - Shutdown was requested; nothing was written
    /// * `Err(CheckpointError)` - The write failed
    pub async fn save_unless_cancelled(
        &self,
        statistics: &SharedStatistics,
        cancel: &CancellationToken,
    ) -> CheckpointResult<Option<Statistics>> {
        let _guard = self.write_lock.lock().await;
        if cancel.is_cancelled() {
            tracing::debug!("Skipping periodic checkpoint, shutdown requested");
            return Ok(None);
        }
        self.save_locked(statistics).await.map(Some)
    }

    /// Persists a snapshot taken earlier instead of the live statistics
    ///
    /// Used when the live statistics run ahead of what is safe to mark done,
    /// such as records that could not be written to the output.
    pub async fn save_snapshot(&self, mut snapshot: Statistics) -> CheckpointResult<Statistics> {
        let _guard = self.write_lock.lock().await;
        let timestamp = Utc::now();
        snapshot.last_checkpoint_time = Some(timestamp);
        self.write(&snapshot, timestamp).await?;

        tracing::info!(
            completed = snapshot.completed(),
            path = %self.path.display(),
            "Checkpoint saved"
        );
        Ok(snapshot)
    }

    async fn save_locked(&self, statistics: &SharedStatistics) -> CheckpointResult<Statistics> {
        let timestamp = Utc::now();
        let snapshot = statistics.checkpoint_snapshot(timestamp);
        self.write(&snapshot, timestamp).await?;

        tracing::info!(
            completed = snapshot.completed(),
            path = %self.path.display(),
            "Checkpoint saved"
        );
        Ok(snapshot)
    }

    /// Writes the given statistics atomically (temp file, fsync, rename)
    async fn write(&self, statistics: &Statistics, timestamp: DateTime<Utc>) -> CheckpointResult<()> {
        let bytes = encode(statistics, timestamp, self.config_hash.clone())?;
        let tmp = temp_path(&self.path);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|source| io_error(&tmp, source))?;
        file.write_all(&bytes)
            .await
            .map_err(|source| io_error(&tmp, source))?;
        file.sync_all()
            .await
            .map_err(|source| io_error(&tmp, source))?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| io_error(&self.path, source))?;
        Ok(())
    }

    /// Loads the last checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Checkpoint))` - A complete, self-consistent checkpoint
    /// * `Ok(None)` - No checkpoint, or one that is truncated, corrupted,
    ///   from another format version, or internally inconsistent
    /// * `Err(CheckpointError)` - The file exists but could not be read
    pub async fn load(&self) -> CheckpointResult<Option<Checkpoint>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&self.path, source)),
        };

        match decode(&bytes) {
            Ok(checkpoint) => {
                tracing::info!(
                    timestamp = %checkpoint.timestamp.to_rfc3339(),
                    processed = checkpoint.statistics.processed_identifiers.len(),
                    "Checkpoint loaded"
                );
                Ok(Some(checkpoint))
            }
            Err(reason) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %reason,
                    "Ignoring unusable checkpoint"
                );
                Ok(None)
            }
        }
    }

    /// Removes the checkpoint, if any
    pub async fn clear(&self) -> CheckpointResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }
}

/// Serializes a checkpoint document
fn encode(
    statistics: &Statistics,
    timestamp: DateTime<Utc>,
    config_hash: Option<String>,
) -> CheckpointResult<Vec<u8>> {
    let statistics = serde_json::to_value(statistics)?;
    let file = CheckpointFile {
        version: CHECKPOINT_FORMAT_VERSION,
        timestamp,
        config_hash,
        checksum: checksum(&statistics)?,
        statistics,
    };
    Ok(serde_json::to_vec_pretty(&file)?)
}

/// Parses and validates a checkpoint document
///
/// The error string names the first check that failed.
fn decode(bytes: &[u8]) -> Result<Checkpoint, String> {
    let file: CheckpointFile =
        serde_json::from_slice(bytes).map_err(|e| format!("malformed JSON: {}", e))?;

    if file.version != CHECKPOINT_FORMAT_VERSION {
        return Err(format!("unsupported format version {}", file.version));
    }

    let expected = checksum(&file.statistics).map_err(|e| e.to_string())?;
    if expected != file.checksum {
        return Err("checksum mismatch".to_string());
    }

    let statistics: Statistics = serde_json::from_value(file.statistics)
        .map_err(|e| format!("incomplete statistics: {}", e))?;

    if !statistics.is_consistent() {
        return Err(format!(
            "counters ({} ok + {} failed) disagree with {} processed identifiers",
            statistics.success_count,
            statistics.failure_count,
            statistics.processed_identifiers.len()
        ));
    }

    Ok(Checkpoint {
        statistics,
        timestamp: file.timestamp,
        config_hash: file.config_hash,
    })
}

// `serde_json::Value` objects are key-sorted, so this is canonical
fn checksum(statistics: &serde_json::Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_vec(statistics)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}
