//! Crawler module for fetching and processing pages
//!
//! This module contains the core ingestion logic, including:
//! - Single-attempt HTTP fetching with error classification
//! - Retry with exponential backoff for transient failures
//! - Content extraction and validation
//! - Rate-limited batch scheduling
//! - Overall run coordination, checkpointing and shutdown handling

mod coordinator;
mod extractor;
mod fetcher;
mod retry;
mod scheduler;

pub use coordinator::{Pipeline, RunOutcome};
pub use extractor::{ExtractedRecord, Extractor, PageMetadata, TABLE_PLACEHOLDER};
pub use fetcher::{build_http_client, fetch_url, FetchResult, HttpFetcher, PageFetcher};
pub use retry::{RetryPolicy, RetryingFetcher, DEFAULT_BACKOFF_BASE};
pub use scheduler::{plan_batches, IssueGate, Scheduler};

use crate::config::Config;
use crate::output::OutputHandler;

/// Runs a complete harvest over HTTP
///
/// This is the main entry point for a run. It will:
/// 1. Restore progress from the checkpoint (when `resume` is set)
/// 2. Build the HTTP client
/// 3. Fetch and extract every remaining item, batch by batch
/// 4. Write each batch's rows, then checkpoint them
///
/// Shutdown can only be requested through [`Pipeline::shutdown_handle`];
/// build the pipeline directly when signals should be honored.
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `items` - Item identifiers in input order
/// * `output` - Receives the extracted records
/// * `resume` - Continue from an existing checkpoint
///
/// # Returns
///
/// * `Ok(RunOutcome)` - The harvest finished
/// * `Err(HarvestError)` - The harvest failed
pub async fn harvest<O>(
    config: &Config,
    items: Vec<String>,
    output: &mut O,
    resume: bool,
) -> crate::Result<RunOutcome>
where
    O: OutputHandler + ?Sized,
{
    Pipeline::new(config, items, resume).await?.run(output).await
}
