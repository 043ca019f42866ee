//! Partition scheduling: accumulation policy, smart exit, window slicing.

use crate::config::{JobConfig, PartitionLength};
use crate::pacing::PacingController;
use crate::retry::Retrier;
use chrono::{DateTime, Months, Utc};
use std::time::Instant;
use tidesync_core::{Cursor, PageSource, Partition, Record, SyncResult, TimeRange};
use tracing::debug;

/// Early-termination heuristic for sequential sources that cannot filter.
///
/// While accumulating, tracks the maximum record timestamp seen per page.
/// Once it crosses the window end plus a late buffer, counts consecutive
/// pages with zero records inside the window; after the configured number
/// of such pages the window is taken as covered and pulling stops.
///
/// This is a tuned policy, not a proof: a sufficiently out-of-order source
/// can defeat it, which is why the threshold is configurable and the
/// heuristic can be disabled entirely.
#[derive(Debug)]
pub struct SmartExit {
    window: TimeRange,
    boundary: DateTime<Utc>,
    threshold: u32,
    crossed: bool,
    empty_streak: u32,
}

impl SmartExit {
    /// Creates a tracker for `window` with the given late `buffer`.
    pub fn new(window: TimeRange, buffer: chrono::Duration, threshold: u32) -> Self {
        Self {
            window,
            boundary: window.end + buffer,
            threshold,
            crossed: false,
            empty_streak: 0,
        }
    }

    /// Observes one fetched page. Returns true once pulling should stop.
    pub fn observe_page(&mut self, records: &[Record]) -> bool {
        let max_ts = records.iter().filter_map(|r| r.timestamp).max();
        if let Some(ts) = max_ts {
            if ts > self.boundary {
                self.crossed = true;
            }
        }

        if !self.crossed {
            return false;
        }

        // Records without timestamps cannot prove coverage; count them as
        // in-window so the streak resets.
        let any_in_window = records
            .iter()
            .any(|r| r.timestamp.map_or(true, |ts| self.window.contains(ts)));

        if any_in_window {
            self.empty_streak = 0;
        } else {
            self.empty_streak += 1;
        }
        self.empty_streak >= self.threshold
    }
}

/// One closed partition's worth of accumulated work.
#[derive(Debug)]
pub struct AccumulatedPartition {
    /// The closed partition.
    pub partition: Partition,
    /// Records to hand to the loader, already filtered to the window.
    pub records: Vec<Record>,
    /// Total records pulled from the source, including out-of-window ones.
    pub fetched: u64,
    /// Cursor to resume from after this partition validates.
    pub next_cursor: Cursor,
    /// Fetch operations performed.
    pub operations: u64,
    /// True if the source reported exhaustion.
    pub exhausted: bool,
    /// True if the smart-exit heuristic fired.
    pub smart_exited: bool,
}

/// Sequential-cursor scheduler.
///
/// Cursors are strictly ordered, so exactly one partition is in flight at
/// a time; the partition closes when the accumulation policy says so.
pub struct SequentialScheduler<'a> {
    source: &'a dyn PageSource,
    retrier: &'a Retrier,
    config: &'a JobConfig,
}

impl<'a> SequentialScheduler<'a> {
    /// Creates a scheduler over `source`.
    pub fn new(source: &'a dyn PageSource, retrier: &'a Retrier, config: &'a JobConfig) -> Self {
        Self {
            source,
            retrier,
            config,
        }
    }

    fn window(&self) -> Option<TimeRange> {
        match (self.config.window_start, self.config.window_end) {
            (Some(start), Some(end)) => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }

    fn smart_exit(&self) -> Option<SmartExit> {
        let threshold = self.config.smart_exit_pages?;
        let window = self.window()?;
        let buffer = chrono::Duration::from_std(self.config.late_buffer).ok()?;
        Some(SmartExit::new(window, buffer, threshold))
    }

    /// Accumulates the next partition starting at `cursor`.
    ///
    /// The partition closes when accumulated records reach `target_size`,
    /// when accumulation wall-clock time exceeds the safety ceiling, when
    /// the smart-exit heuristic fires, or when the source is exhausted.
    pub fn next_partition(
        &self,
        id: u64,
        cursor: Cursor,
        target_size: u64,
        pacer: &mut PacingController,
    ) -> SyncResult<AccumulatedPartition> {
        let mut partition = Partition::sequential(id, cursor.clone());
        partition.begin();

        let started = Instant::now();
        let window = self.window();
        let mut smart_exit = self.smart_exit();

        let mut current = cursor;
        let mut records: Vec<Record> = Vec::new();
        let mut fetched = 0u64;
        let mut operations = 0u64;
        let mut exhausted = false;
        let mut smart_exited = false;

        loop {
            let limit = self.config.page_limit;
            let outcome = self
                .retrier
                .run(|| self.source.fetch_page(&current, limit))?;
            pacer.observe_latency(outcome.latency);
            operations += 1;
            partition.pages += 1;

            let page = outcome.value;
            fetched += page.len() as u64;

            if let Some(tracker) = smart_exit.as_mut() {
                if tracker.observe_page(&page.records) {
                    smart_exited = true;
                }
            }

            // Keep only records inside the job window, when one is set.
            let kept = page.records.into_iter().filter(|r| match (window, r.timestamp) {
                (Some(w), Some(ts)) => w.contains(ts),
                _ => true,
            });
            records.extend(kept);
            partition.records = records.len() as u64;

            match page.next_cursor {
                Some(next) => current = next,
                None => {
                    exhausted = true;
                }
            }

            if exhausted || smart_exited {
                break;
            }
            if records.len() as u64 >= target_size {
                debug!(partition = id, records = records.len(), "size threshold reached");
                break;
            }
            if started.elapsed() >= self.config.accumulation_ceiling {
                debug!(partition = id, "accumulation safety ceiling reached");
                break;
            }
        }

        partition.close(current.clone());
        partition.elapsed = started.elapsed();

        Ok(AccumulatedPartition {
            partition,
            records,
            fetched,
            next_cursor: current,
            operations,
            exhausted,
            smart_exited,
        })
    }
}

/// Slices a sync window into fixed calendar partitions.
///
/// Monthly slicing steps whole calendar months from the window start; the
/// last slice truncates at the window end.
pub fn slice_window(window: TimeRange, length: PartitionLength) -> Vec<TimeRange> {
    let mut slices = Vec::new();
    let mut start = window.start;
    while start < window.end {
        let next = match length {
            PartitionLength::Monthly => start
                .checked_add_months(Months::new(1))
                .unwrap_or(window.end),
            PartitionLength::Fixed(step) => start.checked_add_signed(step).unwrap_or(window.end),
        };
        let end = next.min(window.end);
        if end <= start {
            break;
        }
        slices.push(TimeRange::new(start, end));
        start = end;
    }
    slices
}
