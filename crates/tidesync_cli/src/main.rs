//! TideSync CLI
//!
//! Command-line runner for TideSync jobs over JSONL files.
//!
//! # Commands
//!
//! - `run` - Execute a sync job
//! - `status` - Show a job's checkpoint
//! - `reset` - Clear a job's checkpoint

mod commands;
mod jsonl;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TideSync command-line sync runner.
#[derive(Parser)]
#[command(name = "tidesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding checkpoint files
    #[arg(global = true, short, long, default_value = ".tidesync")]
    checkpoints: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Scheduling mode for a job.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// One partition in flight, delimited by accumulation
    Sequential,
    /// Calendar partitions over a worker pool
    Calendar,
}

/// Idempotent load strategy.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Upsert rows by their natural key
    Upsert,
    /// Delete the partition's range, then insert
    Replace,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a sync job
    Run {
        /// Job name; keys the checkpoint
        #[arg(short, long)]
        job: String,

        /// Source JSONL file
        #[arg(short, long)]
        input: PathBuf,

        /// Destination JSONL file
        #[arg(short, long)]
        output: PathBuf,

        /// Scheduling mode
        #[arg(short, long, value_enum, default_value_t = ModeArg::Sequential)]
        mode: ModeArg,

        /// Load strategy
        #[arg(short, long, value_enum, default_value_t = StrategyArg::Upsert)]
        strategy: StrategyArg,

        /// Window start, RFC 3339
        #[arg(long)]
        window_start: Option<String>,

        /// Window end, RFC 3339
        #[arg(long)]
        window_end: Option<String>,

        /// Records requested per page
        #[arg(long, default_value = "1000")]
        page_limit: u64,

        /// Calendar partition length in days (default: whole months)
        #[arg(long)]
        partition_days: Option<i64>,

        /// Worker pool width (calendar mode)
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Safety cap on fetch operations this run
        #[arg(long)]
        max_operations: Option<u64>,

        /// Allowed difference between expected and loaded row counts
        #[arg(long, default_value = "0")]
        count_tolerance: u64,

        /// Ignore any existing checkpoint and start over
        #[arg(long)]
        force_restart: bool,

        /// Clear any stored checkpoint and sync from scratch
        #[arg(long)]
        no_resume: bool,
    },

    /// Show a job's checkpoint
    Status {
        /// Job name
        #[arg(short, long)]
        job: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear a job's checkpoint
    Reset {
        /// Job name
        #[arg(short, long)]
        job: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            job,
            input,
            output,
            mode,
            strategy,
            window_start,
            window_end,
            page_limit,
            partition_days,
            workers,
            max_operations,
            count_tolerance,
            force_restart,
            no_resume,
        } => {
            let options = commands::run::RunOptions {
                job,
                input,
                output,
                mode,
                strategy,
                window_start,
                window_end,
                page_limit,
                partition_days,
                workers,
                max_operations,
                count_tolerance,
                force_restart,
                no_resume,
            };
            commands::run::run(&cli.checkpoints, options)?;
        }
        Commands::Status { job, format } => {
            commands::status::run(&cli.checkpoints, &job, &format)?;
        }
        Commands::Reset { job } => {
            commands::reset::run(&cli.checkpoints, &job)?;
        }
    }

    Ok(())
}
