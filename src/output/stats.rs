//! Run statistics reporting and resource sampling
//!
//! This module provides:
//! - The summary logged at the end of a run or after a graceful shutdown
//! - Printing the statistics stored in a checkpoint (`--stats`)
//! - Memory and CPU sampling of the current process

use crate::state::Statistics;
use crate::storage::Checkpoint;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, System};

/// Logs the summary of a run
///
/// # Arguments
///
/// * `stats` - Statistics as of the last checkpoint
/// * `interrupted` - Whether the run ended through a shutdown request
pub fn log_summary(stats: &Statistics, interrupted: bool) {
    tracing::info!(
        interrupted,
        succeeded = stats.success_count,
        failed = stats.failure_count,
        retries = stats.retry_count,
        total_bytes = stats.total_bytes,
        elapsed = %format_duration(stats.elapsed_seconds),
        bytes_per_second = format!("{:.1}", stats.bytes_per_second()),
        "Harvest summary"
    );
}

/// Prints checkpointed statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `checkpoint` - The checkpoint to display
pub fn print_statistics(checkpoint: &Checkpoint) {
    let stats = &checkpoint.statistics;

    println!("=== Harvest Statistics ===\n");

    println!("Checkpoint:");
    println!("  Written at: {}", checkpoint.timestamp.to_rfc3339());
    println!("  Started at: {}", stats.start_time.to_rfc3339());
    if let Some(hash) = &checkpoint.config_hash {
        println!("  Config hash: {}", hash);
    }
    println!();

    println!("Progress:");
    println!("  Items processed: {}", stats.completed());
    println!("  Succeeded: {}", stats.success_count);
    println!("  Failed: {}", stats.failure_count);
    println!("  Retries: {}", stats.retry_count);
    println!();

    println!("Throughput:");
    println!("  Content extracted: {}", format_bytes(stats.total_bytes));
    println!("  Run time: {}", format_duration(stats.elapsed_seconds));
    println!("  Average rate: {}/s", format_bytes(stats.bytes_per_second() as u64));
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} items)",
        stats.success_rate(),
        stats.success_count,
        stats.completed()
    );
}

/// Formats a byte count with a binary unit
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Formats seconds as `1h 02m 03s`
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Memory and CPU usage of this process at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// Resident memory in bytes
    pub memory_bytes: u64,

    /// CPU usage since the previous sample, in percent of one core
    pub cpu_percent: f32,
}

impl ResourceSample {
    pub fn memory_mb(&self) -> u64 {
        self.memory_bytes / (1024 * 1024)
    }
}

/// Samples resource usage of the current process
///
/// CPU usage is measured between consecutive samples, so the first sample
/// reports zero.
#[derive(Debug)]
pub struct ResourceMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::debug!(error = e, "Resource sampling unavailable");
                None
            }
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }

    /// Takes a sample, or `None` if the process cannot be inspected
    pub fn sample(&self) -> Option<ResourceSample> {
        let pid = self.pid?;
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        if !system.refresh_process(pid) {
            return None;
        }

        system.process(pid).map(|process| ResourceSample {
            memory_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
        })
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
