//! Page-Harvest main entry point
//!
//! This is the command-line interface for the Page-Harvest content pipeline.

use anyhow::Context;
use clap::Parser;
use page_harvest::config::{compute_config_hash, load_or_default, Config};
use page_harvest::crawler::plan_batches;
use page_harvest::output::{open_output, print_statistics};
use page_harvest::source::read_items;
use page_harvest::storage::CheckpointManager;
use page_harvest::{Pipeline, SharedStatistics};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Page-Harvest: a resumable content ingestion pipeline
///
/// Page-Harvest fetches every page listed in the input CSV under a rate
/// limit, extracts its structured text, and writes one row per page. Progress
/// is checkpointed, so an interrupted run picks up where it stopped.
#[derive(Parser, Debug)]
#[command(name = "page-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable content ingestion pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (written with defaults if missing)
    #[arg(short, long, value_name = "CONFIG", default_value = "scraper_config.toml")]
    config: PathBuf,

    /// CSV file with a URL column listing the pages to fetch
    #[arg(short, long, value_name = "INPUT", default_value = "links.csv")]
    input: PathBuf,

    /// Output table (.csv, or .db/.sqlite for SQLite)
    #[arg(short, long, value_name = "OUTPUT", default_value = "harvest.csv")]
    output: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from the checkpoint (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start over, discarding the checkpoint and previous output
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be fetched without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the checkpoint and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, defaulted) = load_or_default(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    if defaulted {
        tracing::info!("Default configuration written to {}", cli.config.display());
    }

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli).await
    } else if cli.stats {
        handle_stats(&config).await
    } else {
        handle_harvest(config, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("page_harvest=info,warn"),
            1 => EnvFilter::new("page_harvest=debug,info"),
            2 => EnvFilter::new("page_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be fetched
async fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let items = read_items(&cli.input)
        .with_context(|| format!("failed to read items from {}", cli.input.display()))?;
    let submitted = items.len();

    let statistics = if cli.fresh {
        SharedStatistics::default()
    } else {
        CheckpointManager::new(&config.output.checkpoint_path)
            .load()
            .await?
            .map(|checkpoint| SharedStatistics::new(checkpoint.statistics))
            .unwrap_or_default()
    };
    let batches = plan_batches(items, &statistics, config.scraper.batch_size);
    let pending: usize = batches.iter().map(Vec::len).sum();

    println!("=== Page-Harvest Dry Run ===\n");

    println!("Scraper Configuration:");
    println!("  Batch size: {}", config.scraper.batch_size);
    println!("  Rate limit: {}s between requests", config.scraper.rate_limit_seconds);
    println!("  Timeout: {}s", config.scraper.timeout_seconds);
    println!("  Max retries: {}", config.scraper.max_retries);
    println!("  Min content length: {} chars", config.scraper.min_content_length);
    println!("  Checkpoint every: {} items", config.scraper.checkpoint_frequency);
    println!("  User agent: {}", config.scraper.user_agent);
    println!(
        "  Containers: #{} (content), .{} (categories)",
        config.scraper.content_container, config.scraper.category_container
    );

    println!("\nFiles:");
    println!("  Input: {}", cli.input.display());
    println!("  Output: {}", cli.output.display());
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Config hash: {}", compute_config_hash(config)?);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would fetch {} of {} listed items in {} batches",
        pending,
        submitted,
        batches.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the checkpoint
async fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = Path::new(&config.output.checkpoint_path);
    println!("Checkpoint: {}\n", path.display());

    match CheckpointManager::new(path).load().await? {
        Some(checkpoint) => print_statistics(&checkpoint),
        None => println!("No usable checkpoint found."),
    }

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, cli: &Cli) -> anyhow::Result<()> {
    let items = read_items(&cli.input)
        .with_context(|| format!("failed to read items from {}", cli.input.display()))?;

    if cli.fresh {
        tracing::info!("Starting fresh harvest (ignoring previous progress)");
    } else {
        tracing::info!("Starting harvest (will resume from checkpoint if present)");
    }

    let pipeline = Pipeline::new(&config, items, !cli.fresh).await?;
    let mut output = open_output(&cli.output, pipeline.is_resumed())
        .with_context(|| format!("failed to open output {}", cli.output.display()))?;

    let signals = tokio::spawn(pipeline.shutdown_handle().listen_for_signals());
    let result = pipeline.run(output.as_mut()).await;
    signals.abort();

    match result {
        Ok(outcome) => {
            if outcome.interrupted {
                tracing::info!(
                    "Harvest stopped on request; {} rows written, run again to resume",
                    outcome.records_written
                );
            } else {
                tracing::info!(
                    "Harvest completed successfully; {} rows written to {}",
                    outcome.records_written,
                    cli.output.display()
                );
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
