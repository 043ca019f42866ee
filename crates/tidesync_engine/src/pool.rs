//! Calendar-mode worker pool.
//!
//! The sync window is sliced into fixed calendar partitions; up to W
//! workers execute them concurrently. Partitions are independent: a
//! failure in one does not block the others, and success is tracked per
//! partition label in the checkpoint. Checkpoint writes are serialized
//! through a single mutex (single-writer discipline); completions apply
//! in any order since partitions are not a strict sequence.

use crate::config::JobConfig;
use crate::loader::{LoadStrategy, Loader};
use crate::quality::QualityGate;
use crate::retry::Retrier;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tidesync_core::{
    Checkpoint, CheckpointStore, Destination, JobStatus, Partition, RangeSource, SyncError,
    SyncResult, TimeRange,
};
use tracing::{info, warn};

/// Aggregate result of one pool run.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Partitions validated this run.
    pub partitions: u64,
    /// Records fetched this run.
    pub fetched: u64,
    /// Records written this run.
    pub written: u64,
    /// Fetch operations performed (including partition retries).
    pub operations: u64,
    /// Diagnostics for failed partitions.
    pub failures: Vec<String>,
    /// The first typed error observed, preserved for the caller.
    pub error: Option<SyncError>,
    /// True if the max-operations cap stopped the run early.
    pub capped: bool,
    /// True if the run was cancelled.
    pub cancelled: bool,
}

/// Executes calendar partitions over a bounded worker pool.
pub struct CalendarPool<'a> {
    source: &'a dyn RangeSource,
    destination: &'a dyn Destination,
    store: &'a dyn CheckpointStore,
    config: &'a JobConfig,
    cancelled: &'a AtomicBool,
}

impl<'a> CalendarPool<'a> {
    /// Creates a pool.
    pub fn new(
        source: &'a dyn RangeSource,
        destination: &'a dyn Destination,
        store: &'a dyn CheckpointStore,
        config: &'a JobConfig,
        cancelled: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            destination,
            store,
            config,
            cancelled,
        }
    }

    /// Runs every partition in `slices`, skipping ones the checkpoint
    /// already records as complete.
    pub fn run(&self, checkpoint: &Mutex<Checkpoint>, slices: Vec<TimeRange>) -> PoolOutcome {
        let pending: VecDeque<(u64, TimeRange)> = {
            let cp = checkpoint.lock();
            slices
                .into_iter()
                .enumerate()
                .filter(|(_, range)| !cp.is_window_complete(&range.label()))
                .map(|(i, range)| (i as u64, range))
                .collect()
        };

        let queue = Mutex::new(pending);
        let outcome = Mutex::new(PoolOutcome::default());
        let operations = AtomicU64::new(0);
        // Set on fatal or quality failures: in-flight partitions finish,
        // no new ones start.
        let stop = AtomicBool::new(false);
        let retrier = Retrier::new(self.config.retry.clone());

        std::thread::scope(|scope| {
            for _ in 0..self.config.workers {
                scope.spawn(|| {
                    self.worker(&queue, checkpoint, &outcome, &operations, &stop, &retrier)
                });
            }
        });

        outcome.into_inner()
    }

    fn worker(
        &self,
        queue: &Mutex<VecDeque<(u64, TimeRange)>>,
        checkpoint: &Mutex<Checkpoint>,
        outcome: &Mutex<PoolOutcome>,
        operations: &AtomicU64,
        stop: &AtomicBool,
        retrier: &Retrier,
    ) {
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            if self.cancelled.load(Ordering::SeqCst) {
                outcome.lock().cancelled = true;
                break;
            }
            if let Some(cap) = self.config.max_operations {
                if operations.load(Ordering::SeqCst) >= cap {
                    outcome.lock().capped = true;
                    break;
                }
            }

            let Some((id, range)) = queue.lock().pop_front() else {
                break;
            };

            match self.execute_partition(id, range, retrier, operations) {
                Ok((fetched, written)) => {
                    // Single-writer discipline: completions serialize here.
                    let mut cp = checkpoint.lock();
                    if cp.status == JobStatus::Ready {
                        info!(event = "job-state-transition", from = %cp.status, to = %JobStatus::InProgress, "first partition validated");
                        cp.set_status(JobStatus::InProgress);
                    }
                    cp.record_window(range.label(), fetched, written);
                    if let Err(err) = self.store.save(&cp) {
                        warn!(error = %err, "checkpoint save failed");
                        let mut out = outcome.lock();
                        out.failures.push(err.to_string());
                        if out.error.is_none() {
                            out.error = Some(err);
                        }
                        drop(out);
                        stop.store(true, Ordering::SeqCst);
                        continue;
                    }
                    drop(cp);

                    let mut out = outcome.lock();
                    out.partitions += 1;
                    out.fetched += fetched;
                    out.written += written;
                }
                Err(err) => {
                    warn!(partition = id, range = %range, error = %err, "partition failed");
                    let fatal = !err.is_retryable();
                    let mut out = outcome.lock();
                    out.failures.push(format!("partition {range}: {err}"));
                    if out.error.is_none() {
                        out.error = Some(err);
                    }
                    drop(out);
                    if fatal {
                        stop.store(true, Ordering::SeqCst);
                    }
                }
            }
        }

        let total_ops = operations.load(Ordering::SeqCst);
        outcome.lock().operations = total_ops;
    }

    /// Executes one partition, retrying the whole partition from scratch
    /// on retryable failures.
    ///
    /// Never resumes mid-partition: partial writes under concurrent
    /// retries could double-apply, and only the partition-level idempotent
    /// load makes the redo safe.
    fn execute_partition(
        &self,
        id: u64,
        range: TimeRange,
        retrier: &Retrier,
        operations: &AtomicU64,
    ) -> SyncResult<(u64, u64)> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.try_partition(id, range, retrier, operations) {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < self.config.partition_retries => {
                    warn!(
                        partition = id,
                        range = %range,
                        attempt,
                        error = %err,
                        "retrying whole partition"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn try_partition(
        &self,
        id: u64,
        range: TimeRange,
        retrier: &Retrier,
        operations: &AtomicU64,
    ) -> SyncResult<(u64, u64)> {
        let started = Instant::now();
        let mut partition = Partition::calendar(id, range);
        partition.begin();

        let outcome = retrier.run(|| self.source.fetch_range(&range))?;
        operations.fetch_add(1, Ordering::SeqCst);
        let records = outcome.value;
        let fetched = records.len() as u64;
        partition.records = fetched;

        let loader = Loader::new(self.destination, self.config.strategy, self.config.manage_indexes);
        let written = loader.load(&records, Some(&range))?;
        partition.mark_loaded();

        let gate = QualityGate::new(self.config.count_tolerance);
        let mut result = gate.validate(&partition, fetched, written);
        if result.is_ok() && self.config.strategy == LoadStrategy::DeleteRangeInsert {
            result = gate.validate_range(self.destination, &range, fetched)?;
        }
        if !result.is_ok() {
            partition.mark_failed();
            return Err(SyncError::QualityViolation {
                violations: result.violations,
            });
        }

        partition.mark_validated();
        partition.elapsed = started.elapsed();
        info!(
            event = "partition-committed",
            partition = id,
            range = %range,
            rows = written,
            duration_ms = partition.elapsed.as_millis() as u64,
            retries = outcome.retries,
            "calendar partition validated"
        );
        Ok((fetched, written))
    }
}
