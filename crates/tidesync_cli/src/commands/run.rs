//! Run command implementation.

use crate::jsonl::{JsonlDestination, JsonlSource};
use crate::{ModeArg, StrategyArg};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tidesync_core::FileCheckpointStore;
use tidesync_engine::{
    CalendarContext, JobConfig, LoadStrategy, Orchestrator, PartitionLength, SequentialContext,
    SyncMode, SyncSummary,
};
use tracing::info;

/// Parsed options for one `run` invocation.
pub struct RunOptions {
    /// Job name; keys the checkpoint.
    pub job: String,
    /// Source JSONL file.
    pub input: PathBuf,
    /// Destination JSONL file.
    pub output: PathBuf,
    /// Scheduling mode.
    pub mode: ModeArg,
    /// Load strategy.
    pub strategy: StrategyArg,
    /// Window start, RFC 3339.
    pub window_start: Option<String>,
    /// Window end, RFC 3339.
    pub window_end: Option<String>,
    /// Records requested per page.
    pub page_limit: u64,
    /// Calendar partition length in days, or whole months when unset.
    pub partition_days: Option<i64>,
    /// Worker pool width.
    pub workers: usize,
    /// Safety cap on fetch operations.
    pub max_operations: Option<u64>,
    /// Quality gate count tolerance.
    pub count_tolerance: u64,
    /// Ignore any existing checkpoint.
    pub force_restart: bool,
    /// Clear any stored checkpoint and sync from scratch.
    pub no_resume: bool,
}

/// Runs the run command.
pub fn run(checkpoint_dir: &Path, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&options)?;
    let store = FileCheckpointStore::open(checkpoint_dir)?;
    let source = JsonlSource::open(&options.input)?;
    let destination = JsonlDestination::open(&options.output)?;

    info!(
        job = %options.job,
        input = %options.input.display(),
        output = %options.output.display(),
        "starting sync job"
    );

    let orchestrator = Orchestrator::new(config);
    let summary = match options.mode {
        ModeArg::Sequential => orchestrator.run_sequential(SequentialContext {
            source: &source,
            destination: &destination,
            checkpoints: &store,
        })?,
        ModeArg::Calendar => orchestrator.run_calendar(CalendarContext {
            source: &source,
            destination: &destination,
            checkpoints: &store,
        })?,
    };

    print_summary(&summary);
    Ok(())
}

fn build_config(options: &RunOptions) -> Result<JobConfig, Box<dyn std::error::Error>> {
    let mut config = JobConfig::new(&options.job)
        .with_mode(match options.mode {
            ModeArg::Sequential => SyncMode::Sequential,
            ModeArg::Calendar => SyncMode::Calendar,
        })
        .with_strategy(match options.strategy {
            StrategyArg::Upsert => LoadStrategy::UpsertByKey,
            StrategyArg::Replace => LoadStrategy::DeleteRangeInsert,
        })
        .with_page_limit(options.page_limit)
        .with_workers(options.workers);

    if let (Some(start), Some(end)) = (&options.window_start, &options.window_end) {
        config = config.with_window(parse_timestamp(start)?, parse_timestamp(end)?);
    } else if options.window_start.is_some() || options.window_end.is_some() {
        return Err("a sync window needs both --window-start and --window-end".into());
    }

    if let Some(days) = options.partition_days {
        if days <= 0 {
            return Err("--partition-days must be positive".into());
        }
        config = config.with_partition_length(PartitionLength::Fixed(chrono::Duration::days(days)));
    }
    if let Some(cap) = options.max_operations {
        config = config.with_max_operations(cap);
    }
    config.count_tolerance = options.count_tolerance;
    config.force_restart = options.force_restart;
    config.resume = !options.no_resume;
    Ok(config)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| format!("invalid timestamp {value:?}: {e}"))?
        .with_timezone(&Utc))
}

fn print_summary(summary: &SyncSummary) {
    println!("Job:        {}", summary.job);
    println!("Status:     {}", summary.status);
    println!("Partitions: {}", summary.partitions);
    println!("Fetched:    {}", summary.records_fetched);
    println!("Written:    {}", summary.records_written);
    println!("Operations: {}", summary.operations);
    println!("Elapsed:    {:.1}s", summary.elapsed.as_secs_f64());
}
