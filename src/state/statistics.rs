use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Cumulative progress of a harvest, possibly spanning several runs
///
/// `processed_identifiers` is ordered so two snapshots of the same progress
/// serialize byte-for-byte identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// UTF-8 bytes of cleaned content extracted so far
    pub total_bytes: u64,

    /// Items that produced content
    pub success_count: u64,

    /// Items that ended in a terminal error or exhausted their retries
    pub failure_count: u64,

    /// Retries issued for transient failures
    pub retry_count: u64,

    /// When the first run of this harvest started
    pub start_time: DateTime<Utc>,

    /// When the last checkpoint was written
    pub last_checkpoint_time: Option<DateTime<Utc>>,

    /// Seconds spent running, summed over all runs
    pub elapsed_seconds: f64,

    /// Identifiers with a recorded terminal outcome
    pub processed_identifiers: BTreeSet<String>,
}

impl Statistics {
    /// Creates empty statistics starting now
    pub fn new() -> Self {
        Self {
            total_bytes: 0,
            success_count: 0,
            failure_count: 0,
            retry_count: 0,
            start_time: Utc::now(),
            last_checkpoint_time: None,
            elapsed_seconds: 0.0,
            processed_identifiers: BTreeSet::new(),
        }
    }

    /// Checks that every processed identifier was counted exactly once
    pub fn is_consistent(&self) -> bool {
        self.success_count + self.failure_count == self.processed_identifiers.len() as u64
    }

    /// Returns true if the identifier already has a terminal outcome
    pub fn is_processed(&self, identifier: &str) -> bool {
        self.processed_identifiers.contains(identifier)
    }

    /// Number of items with a terminal outcome
    pub fn completed(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Records a successful item
    ///
    /// Returns false (and changes nothing) if the identifier was already
    /// recorded.
    pub fn record_success(&mut self, identifier: &str, size_bytes: u64) -> bool {
        if !self.processed_identifiers.insert(identifier.to_string()) {
            return false;
        }
        self.success_count += 1;
        self.total_bytes += size_bytes;
        true
    }

    /// Records a failed item
    ///
    /// Returns false (and changes nothing) if the identifier was already
    /// recorded.
    pub fn record_failure(&mut self, identifier: &str) -> bool {
        if !self.processed_identifiers.insert(identifier.to_string()) {
            return false;
        }
        self.failure_count += 1;
        true
    }

    /// Undoes a recorded outcome
    ///
    /// `size_bytes` is `Some` for an item recorded as a success. Retries are
    /// left counted. Returns false if the identifier was not recorded.
    pub fn forget(&mut self, identifier: &str, size_bytes: Option<u64>) -> bool {
        if !self.processed_identifiers.remove(identifier) {
            return false;
        }
        match size_bytes {
            Some(bytes) => {
                self.success_count = self.success_count.saturating_sub(1);
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            }
            None => self.failure_count = self.failure_count.saturating_sub(1),
        }
        true
    }

    /// Average extraction rate in bytes per second of run time
    pub fn bytes_per_second(&self) -> f64 {
        if self.elapsed_seconds <= 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.elapsed_seconds
    }

    /// Success rate as a percentage of completed items
    pub fn success_rate(&self) -> f64 {
        let completed = self.completed();
        if completed == 0 {
            return 0.0;
        }
        (self.success_count as f64 / completed as f64) * 100.0
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics shared between concurrently completing fetches
///
/// All mutation goes through a single mutex, and a checkpoint snapshot is
/// taken under the same lock, so a snapshot never sees a half-applied update.
/// The lock is never held across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedStatistics {
    inner: Arc<Mutex<Statistics>>,
    session_start: Instant,
    elapsed_before_session: f64,
}

impl SharedStatistics {
    /// Wraps statistics, either fresh or restored from a checkpoint
    pub fn new(statistics: Statistics) -> Self {
        let elapsed_before_session = statistics.elapsed_seconds;
        Self {
            inner: Arc::new(Mutex::new(statistics)),
            session_start: Instant::now(),
            elapsed_before_session,
        }
    }

    // Every update completes before the guard drops, so poisoned data is still consistent
    fn lock(&self) -> MutexGuard<'_, Statistics> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if the identifier already has a terminal outcome
    pub fn is_processed(&self, identifier: &str) -> bool {
        self.lock().is_processed(identifier)
    }

    /// Records a successful item, returning the completed count after the update
    ///
    /// Returns `None` if the identifier had already been recorded.
    pub fn record_success(&self, identifier: &str, size_bytes: u64) -> Option<u64> {
        let mut stats = self.lock();
        if !stats.record_success(identifier, size_bytes) {
            return None;
        }
        Some(stats.completed())
    }

    /// Records a failed item, returning the completed count after the update
    ///
    /// Returns `None` if the identifier had already been recorded.
    pub fn record_failure(&self, identifier: &str) -> Option<u64> {
        let mut stats = self.lock();
        if !stats.record_failure(identifier) {
            return None;
        }
        Some(stats.completed())
    }

    /// Number of items with a recorded outcome
    pub fn completed(&self) -> u64 {
        self.lock().completed()
    }

    /// Counts one retry
    pub fn record_retry(&self) {
        self.lock().retry_count += 1;
    }

    /// Stamps the checkpoint time and returns a consistent copy
    ///
    /// `elapsed_seconds` in the copy includes the time spent in this session.
    pub fn checkpoint_snapshot(&self, at: DateTime<Utc>) -> Statistics {
        let mut stats = self.lock();
        stats.last_checkpoint_time = Some(at);
        stats.elapsed_seconds = self.elapsed_now();
        stats.clone()
    }

    /// Returns a consistent copy without marking a checkpoint
    pub fn snapshot(&self) -> Statistics {
        let mut stats = self.lock().clone();
        stats.elapsed_seconds = self.elapsed_now();
        stats
    }

    fn elapsed_now(&self) -> f64 {
        self.elapsed_before_session + self.session_start.elapsed().as_secs_f64()
    }
}

impl Default for SharedStatistics {
    fn default() -> Self {
        Self::new(Statistics::new())
    }
}
