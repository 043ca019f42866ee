//! The sync orchestrator: job lifecycle, resume, and terminal states.

use crate::config::{JobConfig, SyncMode};
use crate::loader::{LoadStrategy, Loader};
use crate::pacing::PacingController;
use crate::pool::CalendarPool;
use crate::quality::QualityGate;
use crate::retry::Retrier;
use crate::scheduler::{slice_window, SequentialScheduler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tidesync_core::{
    Checkpoint, CheckpointStore, Destination, JobStatus, PageSource, RangeSource, SyncError,
    SyncResult, TimeRange,
};
use tracing::{info, warn};

/// Connector and store handles for a sequential-cursor job.
///
/// An explicit context object: handles live for one job invocation, never
/// as process-wide state.
pub struct SequentialContext<'a> {
    /// The paginated source.
    pub source: &'a dyn PageSource,
    /// The warehouse destination.
    pub destination: &'a dyn Destination,
    /// Durable checkpoint persistence.
    pub checkpoints: &'a dyn CheckpointStore,
}

/// Connector and store handles for a random-access job.
pub struct CalendarContext<'a> {
    /// The range-queryable source.
    pub source: &'a dyn RangeSource,
    /// The warehouse destination.
    pub destination: &'a dyn Destination,
    /// Durable checkpoint persistence.
    pub checkpoints: &'a dyn CheckpointStore,
}

/// Result summary returned on `COMPLETED` or `INTERRUPTED`.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Job name.
    pub job: String,
    /// Terminal status of this run.
    pub status: JobStatus,
    /// Partitions validated this run.
    pub partitions: u64,
    /// Records fetched this run.
    pub records_fetched: u64,
    /// Records written this run.
    pub records_written: u64,
    /// Fetch operations performed this run.
    pub operations: u64,
    /// Wall-clock time of this run.
    pub elapsed: Duration,
}

/// Ties checkpointing, scheduling, fetching, loading, and validation into
/// one job lifecycle.
///
/// State machine: `READY → IN_PROGRESS → {COMPLETED | INTERRUPTED |
/// ERROR}`. The checkpoint cursor only advances after the quality gate
/// passes, so a crash at any point restarts from the last safe position.
pub struct Orchestrator {
    config: JobConfig,
    cancelled: Arc<AtomicBool>,
}

impl Orchestrator {
    /// Creates an orchestrator for `config`.
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The job configuration.
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Requests cancellation; in-flight work stops at the next partition
    /// boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// A handle other threads can use to cancel this job.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Runs a sequential-cursor job to a terminal state.
    pub fn run_sequential(&self, ctx: SequentialContext<'_>) -> SyncResult<SyncSummary> {
        if self.config.mode != SyncMode::Sequential {
            return Err(SyncError::fatal("job is not configured for sequential mode"));
        }
        if self.config.strategy == LoadStrategy::DeleteRangeInsert {
            // Accumulated partitions have no range identity to replace.
            return Err(SyncError::fatal(
                "delete-range-then-insert requires calendar partitions",
            ));
        }

        let started = Instant::now();
        let Some(mut checkpoint) = self.prepare_checkpoint(ctx.checkpoints)? else {
            return Ok(self.noop_summary(started));
        };

        let mut pacer = PacingController::new(self.config.pacing.clone());
        let retrier = Retrier::new(self.config.retry.clone());
        let scheduler = SequentialScheduler::new(ctx.source, &retrier, &self.config);
        let loader = Loader::new(ctx.destination, self.config.strategy, self.config.manage_indexes);
        let gate = QualityGate::new(self.config.count_tolerance);

        let mut size = checkpoint
            .adaptive_size
            .clamp(self.config.pacing.min_size, self.config.pacing.max_size);
        let mut operations = 0u64;
        let mut partitions = 0u64;
        let mut fetched_run = 0u64;
        let mut written_run = 0u64;
        let mut id = checkpoint.partitions_validated;

        loop {
            if self.is_cancelled() {
                self.transition(&mut checkpoint, JobStatus::Interrupted);
                ctx.checkpoints.save(&checkpoint)?;
                return Ok(self.summary(
                    &checkpoint,
                    partitions,
                    fetched_run,
                    written_run,
                    operations,
                    started,
                ));
            }
            if let Some(cap) = self.config.max_operations {
                if operations >= cap {
                    warn!(operations, cap, "max-operations safety cap reached");
                    self.transition(&mut checkpoint, JobStatus::Interrupted);
                    ctx.checkpoints.save(&checkpoint)?;
                    return Ok(self.summary(
                        &checkpoint,
                        partitions,
                        fetched_run,
                        written_run,
                        operations,
                        started,
                    ));
                }
            }

            let acc =
                match scheduler.next_partition(id, checkpoint.cursor.clone(), size, &mut pacer) {
                    Ok(acc) => acc,
                    Err(err) => {
                        return self.fail(ctx.checkpoints, &mut checkpoint, err, None);
                    }
                };
            operations += acc.operations;

            let mut partition = acc.partition;
            let expected = acc.records.len() as u64;

            // A terminal empty probe: nothing to load, nothing to advance.
            if acc.exhausted && acc.fetched == 0 && expected == 0 {
                self.transition(&mut checkpoint, JobStatus::Completed);
                ctx.checkpoints.save(&checkpoint)?;
                break;
            }

            let written = if acc.records.is_empty() {
                0
            } else {
                match loader.load(&acc.records, None) {
                    Ok(written) => written,
                    Err(err) => {
                        partition.mark_failed();
                        return self.fail(ctx.checkpoints, &mut checkpoint, err, None);
                    }
                }
            };
            partition.mark_loaded();

            let result = gate.validate(&partition, expected, written);
            if !result.is_ok() {
                partition.mark_failed();
                let err = SyncError::QualityViolation {
                    violations: result.violations,
                };
                return self.fail(ctx.checkpoints, &mut checkpoint, err, None);
            }
            partition.mark_validated();

            self.transition(&mut checkpoint, JobStatus::InProgress);
            checkpoint.advance(acc.next_cursor, acc.fetched, written);
            pacer.observe_partition(partition.elapsed);
            size = pacer.next_size(size);
            checkpoint.adaptive_size = size;
            ctx.checkpoints.save(&checkpoint)?;

            info!(
                event = "partition-committed",
                partition = partition.id,
                rows = written,
                pages = partition.pages,
                duration_ms = partition.elapsed.as_millis() as u64,
                next_size = size,
                "partition validated and checkpointed"
            );

            partitions += 1;
            fetched_run += acc.fetched;
            written_run += written;
            id += 1;

            if acc.exhausted || acc.smart_exited {
                self.transition(&mut checkpoint, JobStatus::Completed);
                ctx.checkpoints.save(&checkpoint)?;
                break;
            }
        }

        Ok(self.summary(
            &checkpoint,
            partitions,
            fetched_run,
            written_run,
            operations,
            started,
        ))
    }

    /// Runs a random-access calendar job to a terminal state.
    pub fn run_calendar(&self, ctx: CalendarContext<'_>) -> SyncResult<SyncSummary> {
        if self.config.mode != SyncMode::Calendar {
            return Err(SyncError::fatal("job is not configured for calendar mode"));
        }
        let (Some(start), Some(end)) = (self.config.window_start, self.config.window_end) else {
            return Err(SyncError::fatal("calendar mode requires a bounded window"));
        };

        let started = Instant::now();
        let Some(checkpoint) = self.prepare_checkpoint(ctx.checkpoints)? else {
            return Ok(self.noop_summary(started));
        };

        let slices = slice_window(TimeRange::new(start, end), self.config.partition_length);
        let shared = Mutex::new(checkpoint);
        let pool = CalendarPool::new(
            ctx.source,
            ctx.destination,
            ctx.checkpoints,
            &self.config,
            &self.cancelled,
        );
        let outcome = pool.run(&shared, slices);
        let mut checkpoint = shared.into_inner();

        if let Some(err) = outcome.error {
            // The first typed error surfaces as-is; the checkpoint keeps
            // the full per-partition diagnostics.
            let diagnostic = if outcome.failures.is_empty() {
                None
            } else {
                Some(outcome.failures.join("; "))
            };
            return self.fail(ctx.checkpoints, &mut checkpoint, err, diagnostic);
        }

        let status = if outcome.cancelled || outcome.capped {
            JobStatus::Interrupted
        } else {
            JobStatus::Completed
        };
        self.transition(&mut checkpoint, status);
        ctx.checkpoints.save(&checkpoint)?;

        Ok(self.summary(
            &checkpoint,
            outcome.partitions,
            outcome.fetched,
            outcome.written,
            outcome.operations,
            started,
        ))
    }

    /// Loads, clears, or creates the checkpoint per the resume flags.
    ///
    /// Both `force_restart` and `resume = false` clear any stored
    /// checkpoint before the run: a fresh run's saves must never
    /// interleave with prior progress, or the persisted cursor could move
    /// backward.
    ///
    /// Returns `None` when the job is already complete and there is
    /// nothing to do.
    fn prepare_checkpoint(&self, store: &dyn CheckpointStore) -> SyncResult<Option<Checkpoint>> {
        if self.config.force_restart || !self.config.resume {
            store.clear(&self.config.name)?;
        }

        let existing = store.load(&self.config.name)?;

        match existing {
            Some(cp) if cp.status == JobStatus::Completed => {
                info!(job = %self.config.name, "checkpoint already COMPLETED; nothing to do");
                Ok(None)
            }
            Some(cp) => {
                info!(
                    job = %self.config.name,
                    status = %cp.status,
                    cursor = %cp.cursor,
                    partitions = cp.partitions_validated,
                    "resuming from checkpoint"
                );
                Ok(Some(cp))
            }
            None => {
                let initial = self
                    .config
                    .pacing
                    .initial_size
                    .clamp(self.config.pacing.min_size, self.config.pacing.max_size);
                Ok(Some(Checkpoint::new(&self.config.name, initial)))
            }
        }
    }

    /// Persists the diagnostic, transitions to `ERROR`, and surfaces `err`.
    ///
    /// `diagnostic` overrides the stored message when the caller has more
    /// context than the error itself carries.
    fn fail(
        &self,
        store: &dyn CheckpointStore,
        checkpoint: &mut Checkpoint,
        err: SyncError,
        diagnostic: Option<String>,
    ) -> SyncResult<SyncSummary> {
        info!(
            event = "job-state-transition",
            job = %self.config.name,
            from = %checkpoint.status,
            to = %JobStatus::Error,
            error = %err,
            "job failed"
        );
        checkpoint.set_error(diagnostic.unwrap_or_else(|| err.to_string()));
        if let Err(save_err) = store.save(checkpoint) {
            warn!(error = %save_err, "failed to persist error diagnostic");
        }
        Err(err)
    }

    fn transition(&self, checkpoint: &mut Checkpoint, to: JobStatus) {
        if checkpoint.status != to {
            info!(
                event = "job-state-transition",
                job = %self.config.name,
                from = %checkpoint.status,
                to = %to,
                "job state changed"
            );
        }
        checkpoint.set_status(to);
    }

    fn summary(
        &self,
        checkpoint: &Checkpoint,
        partitions: u64,
        fetched: u64,
        written: u64,
        operations: u64,
        started: Instant,
    ) -> SyncSummary {
        SyncSummary {
            job: self.config.name.clone(),
            status: checkpoint.status,
            partitions,
            records_fetched: fetched,
            records_written: written,
            operations,
            elapsed: started.elapsed(),
        }
    }

    fn noop_summary(&self, started: Instant) -> SyncSummary {
        SyncSummary {
            job: self.config.name.clone(),
            status: JobStatus::Completed,
            partitions: 0,
            records_fetched: 0,
            records_written: 0,
            operations: 0,
            elapsed: started.elapsed(),
        }
    }
}
