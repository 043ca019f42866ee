//! Partition units of work and their lifecycle.

use crate::types::{Cursor, TimeRange};
use std::time::Duration;

/// The lifecycle status of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    /// Created by the scheduler, not yet started.
    Pending,
    /// Fetching or accumulating records.
    InFlight,
    /// Written to the destination, awaiting validation.
    Loaded,
    /// Validation passed; the checkpoint may advance past it.
    Validated,
    /// Load or validation failed.
    Failed,
}

impl PartitionStatus {
    /// Returns true if the partition will never be worked on again.
    pub fn is_terminal(self) -> bool {
        matches!(self, PartitionStatus::Validated | PartitionStatus::Failed)
    }
}

/// A bounded, independently loadable and validatable unit of work.
///
/// Sequential-cursor partitions are delimited by cursors and closed by the
/// accumulation policy; calendar partitions are delimited by a fixed
/// [`TimeRange`]. Either way, the partition is the unit of idempotent load
/// and of checkpoint advancement.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Ordinal within this run, for logging.
    pub id: u64,
    /// Cursor at which fetching started.
    pub start: Cursor,
    /// Cursor after the last fetched page; `None` until the partition closes.
    pub end: Option<Cursor>,
    /// Calendar bounds, for random-access partitions.
    pub window: Option<TimeRange>,
    /// Current lifecycle status.
    pub status: PartitionStatus,
    /// Records accumulated so far.
    pub records: u64,
    /// Pages fetched so far (sequential mode).
    pub pages: u64,
    /// Wall-clock time spent on the partition.
    pub elapsed: Duration,
}

impl Partition {
    /// Creates a sequential-cursor partition starting at `start`.
    pub fn sequential(id: u64, start: Cursor) -> Self {
        Self {
            id,
            start,
            end: None,
            window: None,
            status: PartitionStatus::Pending,
            records: 0,
            pages: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Creates a calendar partition covering `window`.
    pub fn calendar(id: u64, window: TimeRange) -> Self {
        Self {
            id,
            start: Cursor::start(),
            end: None,
            window: Some(window),
            status: PartitionStatus::Pending,
            records: 0,
            pages: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Stable identity label for checkpoint bookkeeping (calendar mode).
    pub fn label(&self) -> Option<String> {
        self.window.map(|w| w.label())
    }

    /// Marks the partition in flight.
    pub fn begin(&mut self) {
        self.status = PartitionStatus::InFlight;
    }

    /// Closes the fetch side of a sequential partition at `end`.
    pub fn close(&mut self, end: Cursor) {
        self.end = Some(end);
    }

    /// Marks the partition loaded into the destination.
    pub fn mark_loaded(&mut self) {
        self.status = PartitionStatus::Loaded;
    }

    /// Marks the partition validated.
    pub fn mark_validated(&mut self) {
        self.status = PartitionStatus::Validated;
    }

    /// Marks the partition failed.
    pub fn mark_failed(&mut self) {
        self.status = PartitionStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn sequential_lifecycle() {
        let mut p = Partition::sequential(1, Cursor::start());
        assert_eq!(p.status, PartitionStatus::Pending);
        assert!(p.label().is_none());

        p.begin();
        assert_eq!(p.status, PartitionStatus::InFlight);

        p.close(Cursor::new("page-10"));
        p.mark_loaded();
        p.mark_validated();
        assert!(p.status.is_terminal());
        assert_eq!(p.end, Some(Cursor::new("page-10")));
    }

    #[test]
    fn calendar_partition_label() {
        let window = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        let p = Partition::calendar(3, window);
        assert_eq!(p.label().as_deref(), Some(window.label().as_str()));
    }

    #[test]
    fn failed_is_terminal() {
        let mut p = Partition::sequential(1, Cursor::start());
        p.begin();
        p.mark_failed();
        assert!(p.status.is_terminal());
    }
}
