//! Pipeline coordinator - main harvest orchestration logic
//!
//! This module ties the pieces of a run together:
//! - Restoring progress from the checkpoint, or starting fresh
//! - Driving the scheduler batch by batch
//! - Writing each batch's rows before any checkpoint covers them
//! - Periodic checkpoints with a resource sample
//! - Reacting to a shutdown request with a forced checkpoint
//! - Logging the run summary

use crate::config::{compute_config_hash, validate, Config};
use crate::crawler::extractor::ExtractedRecord;
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scheduler::Scheduler;
use crate::output::{log_summary, OutputHandler, ResourceMonitor};
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::state::{SharedStatistics, Statistics};
use crate::storage::CheckpointManager;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Statistics as persisted in the last checkpoint of the run
    pub statistics: Statistics,

    /// Rows written to the output
    pub records_written: usize,

    /// True if the run ended through a shutdown request
    pub interrupted: bool,

    /// Shutdown state at the end of the run
    pub state: ShutdownState,
}

/// A configured harvest, ready to run
pub struct Pipeline<F> {
    scheduler: Scheduler<F>,
    statistics: SharedStatistics,
    checkpoints: CheckpointManager,
    checkpoint_frequency: u64,
    monitor: ResourceMonitor,
    shutdown: Arc<ShutdownCoordinator>,
    resumed: bool,
}

impl Pipeline<HttpFetcher> {
    /// Creates a pipeline that fetches over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `items` - Item identifiers in input order
    /// * `resume` - Continue from the checkpoint if one exists; otherwise
    ///   any existing checkpoint is discarded
    ///
    /// # Returns
    ///
    /// * `Ok(Pipeline)` - Ready to run
    /// * `Err(HarvestError)` - Invalid config, unreadable checkpoint, or the
    ///   HTTP client could not be built
    pub async fn new(config: &Config, items: Vec<String>, resume: bool) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.scraper)?;
        Self::with_fetcher(config, items, fetcher, resume).await
    }
}

impl<F: PageFetcher> Pipeline<F> {
    /// Creates a pipeline around any fetcher
    pub async fn with_fetcher(
        config: &Config,
        items: Vec<String>,
        fetcher: F,
        resume: bool,
    ) -> Result<Self> {
        validate(config)?;
        let config_hash = compute_config_hash(config)?;
        let checkpoints = CheckpointManager::new(&config.output.checkpoint_path)
            .with_config_hash(config_hash.clone());

        let (statistics, resumed) = restore_statistics(&checkpoints, &config_hash, resume).await?;
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let scheduler = Scheduler::new(
            items,
            &config.scraper,
            fetcher,
            statistics.clone(),
            shutdown.token(),
        )?;

        Ok(Self {
            scheduler,
            statistics,
            checkpoints,
            checkpoint_frequency: config.scraper.checkpoint_frequency.max(1),
            monitor: ResourceMonitor::new(),
            shutdown,
            resumed,
        })
    }

    /// Overrides the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.scheduler = self.scheduler.with_retry_policy(policy);
        self
    }

    /// Live statistics of the run
    pub fn statistics(&self) -> SharedStatistics {
        self.statistics.clone()
    }

    /// Handle for requesting shutdown from outside the run
    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.shutdown)
    }

    /// Returns true if progress was restored from a checkpoint
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Items that will be fetched (after resume skipping)
    pub fn pending_items(&self) -> usize {
        self.scheduler.pending_items()
    }

    pub fn checkpoint_path(&self) -> &Path {
        self.checkpoints.path()
    }

    /// Runs the harvest to completion or until shutdown
    ///
    /// The rows of each batch are written and flushed as soon as the batch
    /// resolves, and a checkpoint only ever covers rows that are already
    /// written. On shutdown the checkpoint is forced as soon as the request
    /// arrives while in-flight fetches keep draining; of the batch in flight,
    /// only the rows covered by that checkpoint are written.
    ///
    /// # Arguments
    ///
    /// * `output` - Receives the records of this run in input order
    ///
    /// # Returns
    ///
    /// * `Ok(RunOutcome)` - The run finished or shut down gracefully
    /// * `Err(HarvestError)` - The output could not be written, or a
    ///   required checkpoint could not be saved
    pub async fn run<O>(mut self, output: &mut O) -> Result<RunOutcome>
    where
        O: OutputHandler + ?Sized,
    {
        tracing::info!(
            pending = self.scheduler.pending_items(),
            "Starting harvest"
        );

        let token = self.shutdown.token();
        let mut forced: Option<Statistics> = None;
        let mut written = 0;
        let mut last_completed = self.statistics.completed();

        // Only polled once shutdown has been requested
        let forced_save = force_checkpoint(&self.shutdown, &self.checkpoints, &self.statistics);
        tokio::pin!(forced_save);

        loop {
            // The batch and the forced save are polled together, so a save in
            // progress never stalls in-flight fetches and none are dropped.
            let batch = {
                let next = self.scheduler.next_batch();
                tokio::pin!(next);
                loop {
                    tokio::select! {
                        biased;
                        saved = &mut forced_save, if forced.is_none() && token.is_cancelled() => {
                            forced = Some(saved?);
                        }
                        _ = token.cancelled(), if !token.is_cancelled() => {}
                        batch = &mut next => break batch,
                    }
                }
            };

            if forced.is_none() && token.is_cancelled() {
                forced = Some((&mut forced_save).await?);
            }

            let Some(records) = batch else { break };
            let records = match &forced {
                Some(checkpointed) => covered_by(records, checkpointed),
                None => records,
            };

            if let Err(e) = persist(output, &records) {
                if forced.is_none() {
                    self.checkpoint_written(&records).await;
                }
                return Err(e);
            }
            written += records.len();

            let completed = self.statistics.completed();
            let frequency = self.checkpoint_frequency;
            if forced.is_none() && completed / frequency > last_completed / frequency {
                self.periodic_checkpoint(completed, &token).await;
            }
            last_completed = completed;
        }

        match forced {
            Some(checkpointed) => self.finish_interrupted(checkpointed, written),
            None => self.finish_completed(written).await,
        }
    }

    async fn finish_completed(&self, written: usize) -> Result<RunOutcome> {
        let statistics = self.checkpoints.save(&self.statistics).await?;
        tracing::info!(written, "Harvest complete");
        log_summary(&statistics, false);

        Ok(RunOutcome {
            statistics,
            records_written: written,
            interrupted: false,
            state: self.shutdown.state(),
        })
    }

    fn finish_interrupted(&self, checkpointed: Statistics, written: usize) -> Result<RunOutcome> {
        self.shutdown.transition(ShutdownState::Terminated)?;
        log_summary(&checkpointed, true);

        Ok(RunOutcome {
            statistics: checkpointed,
            records_written: written,
            interrupted: true,
            state: self.shutdown.state(),
        })
    }

    /// Checkpoints every written row, leaving out `unwritten`
    ///
    /// Called after the output failed, so a resume fetches the lost rows again.
    async fn checkpoint_written(&self, unwritten: &[ExtractedRecord]) {
        let mut snapshot = self.statistics.snapshot();
        for record in unwritten {
            let size_bytes = record.is_success().then_some(record.size_bytes);
            snapshot.forget(&record.identifier, size_bytes);
        }

        if let Err(e) = self.checkpoints.save_snapshot(snapshot).await {
            tracing::error!(error = %e, "Checkpoint after output failure also failed");
        }
    }

    async fn periodic_checkpoint(&self, completed: u64, token: &CancellationToken) {
        match self.checkpoints.save_unless_cancelled(&self.statistics, token).await {
            Ok(Some(_)) => {
                if let Some(sample) = self.monitor.sample() {
                    tracing::info!(
                        completed,
                        memory_mb = sample.memory_mb(),
                        cpu_percent = format!("{:.1}", sample.cpu_percent),
                        "Resource usage"
                    );
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "Periodic checkpoint failed"),
        }
    }
}

/// Loads the checkpoint when resuming, or clears it for a fresh run
///
/// A checkpoint written under a different configuration is still used, with
/// a warning. The flag is true if a checkpoint was restored.
async fn restore_statistics(
    checkpoints: &CheckpointManager,
    config_hash: &str,
    resume: bool,
) -> Result<(SharedStatistics, bool)> {
    if !resume {
        checkpoints.clear().await?;
        tracing::info!("Starting fresh harvest");
        return Ok((SharedStatistics::default(), false));
    }

    match checkpoints.load().await? {
        Some(checkpoint) => {
            if checkpoint.config_hash.as_deref() != Some(config_hash) {
                tracing::warn!(
                    "Configuration changed since the checkpoint was written; resuming anyway"
                );
            }
            tracing::info!(
                processed = checkpoint.statistics.completed(),
                "Resuming from checkpoint"
            );
            Ok((SharedStatistics::new(checkpoint.statistics), true))
        }
        None => {
            tracing::info!("No usable checkpoint, starting new harvest");
            Ok((SharedStatistics::default(), false))
        }
    }
}

/// Saves the shutdown checkpoint and advances the shutdown state
async fn force_checkpoint(
    shutdown: &ShutdownCoordinator,
    checkpoints: &CheckpointManager,
    statistics: &SharedStatistics,
) -> Result<Statistics> {
    // No-op when the request came through the coordinator
    shutdown.request();

    let snapshot = checkpoints.save(statistics).await?;
    shutdown.transition(ShutdownState::Checkpointed)?;
    tracing::info!(
        completed = snapshot.completed(),
        "Shutdown checkpoint saved, waiting for in-flight fetches"
    );
    Ok(snapshot)
}

/// Records of a drained batch that the shutdown checkpoint covers
fn covered_by(records: Vec<ExtractedRecord>, checkpointed: &Statistics) -> Vec<ExtractedRecord> {
    let drained = records.len();
    let covered: Vec<ExtractedRecord> = records
        .into_iter()
        .filter(|record| checkpointed.is_processed(&record.identifier))
        .collect();

    tracing::info!(
        covered = covered.len(),
        not_checkpointed = drained - covered.len(),
        "In-flight fetches drained"
    );
    covered
}

/// Writes and flushes one batch of rows
fn persist<O>(output: &mut O, records: &[ExtractedRecord]) -> Result<usize>
where
    O: OutputHandler + ?Sized,
{
    let written = output.write_records(records)?;
    output.flush()?;
    Ok(written)
}
