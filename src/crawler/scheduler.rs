//! Rate-limited batch scheduler
//!
//! This module handles:
//! - Skipping items that already have a recorded outcome, and duplicates
//! - Partitioning the remaining items into batches of `batch_size`
//! - Running each batch concurrently, one batch at a time
//! - A shared issue gate that spaces out fetch issues by the rate limit
//! - Recording each outcome in the shared statistics
//! - Stopping cooperatively once shutdown is requested

use super::extractor::{ExtractedRecord, Extractor};
use super::fetcher::PageFetcher;
use super::retry::{RetryPolicy, RetryingFetcher};
use crate::config::ScraperConfig;
use crate::state::{ErrorKind, SharedStatistics};
use crate::ConfigError;
use futures::future::join_all;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spaces out fetch issues by a fixed interval
///
/// Each caller reserves the next free slot and sleeps until it. The slot
/// carries over between batches, so the interval holds across batch
/// boundaries no matter how long responses take.
#[derive(Debug)]
pub struct IssueGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl IssueGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits for this caller's issue slot
    pub async fn wait(&self) {
        let slot = {
            let mut next = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

/// Drops already processed and duplicate items, then splits the rest into batches
///
/// Input order is preserved; a duplicate keeps its first position.
pub fn plan_batches(
    items: Vec<String>,
    statistics: &SharedStatistics,
    batch_size: usize,
) -> VecDeque<Vec<String>> {
    let mut seen = HashSet::new();
    let remaining: Vec<String> = items
        .into_iter()
        .filter(|id| !statistics.is_processed(id) && seen.insert(id.clone()))
        .collect();

    remaining
        .chunks(batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect()
}

/// Drives fetches batch by batch
///
/// The scheduler is a pull-based sequence: each call to `next_batch` runs one
/// batch to completion and returns its records in input order. Persisting
/// those records and checkpointing them is left to the caller, between
/// batches.
pub struct Scheduler<F> {
    fetcher: RetryingFetcher<F>,
    extractor: Extractor,
    statistics: SharedStatistics,
    gate: IssueGate,
    pending: VecDeque<Vec<String>>,
    cancel: CancellationToken,
    batches_done: usize,
    total_batches: usize,
}

impl<F: PageFetcher> Scheduler<F> {
    /// Creates a scheduler over the given items
    ///
    /// # Arguments
    ///
    /// * `items` - Item identifiers in input order
    /// * `config` - Scraper configuration
    /// * `fetcher` - Single-attempt fetcher; retries are layered on top
    /// * `statistics` - Shared statistics, possibly restored from a checkpoint
    /// * `cancel` - Token cancelled when shutdown is requested
    ///
    /// # Returns
    ///
    /// * `Ok(Scheduler)` - Ready to run
    /// * `Err(ConfigError)` - The extraction selectors are invalid
    pub fn new(
        items: Vec<String>,
        config: &ScraperConfig,
        fetcher: F,
        statistics: SharedStatistics,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let submitted = items.len();
        let pending = plan_batches(items, &statistics, config.batch_size);
        let remaining: usize = pending.iter().map(Vec::len).sum();

        if remaining < submitted {
            info!(
                skipped = submitted - remaining,
                remaining,
                "Skipping items already processed or listed twice"
            );
        }

        let policy = RetryPolicy::new(config.max_retries);
        Ok(Self {
            fetcher: RetryingFetcher::new(fetcher, policy, statistics.clone(), cancel.clone()),
            extractor: Extractor::new(config)?,
            statistics,
            gate: IssueGate::new(config.rate_limit()),
            total_batches: pending.len(),
            pending,
            cancel,
            batches_done: 0,
        })
    }

    /// Overrides the retry policy (tests use a short backoff)
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.fetcher = RetryingFetcher::new(
            self.fetcher.into_inner(),
            policy,
            self.statistics.clone(),
            self.cancel.clone(),
        );
        self
    }

    /// Number of items not yet handed to a batch
    pub fn pending_items(&self) -> usize {
        self.pending.iter().map(Vec::len).sum()
    }

    /// Runs the next batch to completion
    ///
    /// # Returns
    ///
    /// * `Some(records)` - Records of the items issued in this batch, in
    ///   input order. Items skipped because shutdown was requested
    ///   mid-batch produce no record.
    /// * `None` - No batches remain, or shutdown was requested
    pub async fn next_batch(&mut self) -> Option<Vec<ExtractedRecord>> {
        if self.cancel.is_cancelled() {
            debug!(remaining = self.pending_items(), "Shutdown requested, no further batches");
            return None;
        }

        let batch = self.pending.pop_front()?;
        self.batches_done += 1;
        debug!(
            batch = self.batches_done,
            total = self.total_batches,
            size = batch.len(),
            "Starting batch"
        );

        let outcomes = join_all(batch.iter().map(|id| self.process_item(id))).await;
        let records: Vec<ExtractedRecord> = outcomes.into_iter().flatten().collect();

        let succeeded = records.iter().filter(|r| r.is_success()).count();
        info!(
            batch = self.batches_done,
            total = self.total_batches,
            succeeded,
            failed = records.len() - succeeded,
            "Batch complete"
        );

        Some(records)
    }

    /// Fetches, extracts and records one item
    ///
    /// Returns `None` if the item was not issued because shutdown was
    /// requested while it waited for its slot.
    async fn process_item(&self, identifier: &str) -> Option<ExtractedRecord> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(url = %identifier, "Not issuing, shutdown requested");
                return None;
            }
            _ = self.gate.wait() => {}
        }

        let fetched = self.fetcher.fetch(identifier).await;
        let record = match (fetched.error, fetched.payload) {
            (Some(error), _) => ExtractedRecord::failed(identifier, error),
            (None, Some(payload)) => self
                .extractor
                .extract(identifier, &payload, fetched.last_modified.as_deref())
                .unwrap_or_else(|error| ExtractedRecord::failed(identifier, error)),
            (None, None) => ExtractedRecord::failed(identifier, ErrorKind::ParseError),
        };

        match record.error {
            None => {
                debug!(url = %identifier, bytes = record.size_bytes, "Extracted page");
                self.statistics.record_success(identifier, record.size_bytes);
            }
            Some(error) => {
                warn!(url = %identifier, error = %error, "Item failed");
                self.statistics.record_failure(identifier);
            }
        }

        Some(record)
    }
}
