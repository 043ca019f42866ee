//! Idempotent partition loads.

use tidesync_core::{Destination, Record, SyncError, SyncResult, TimeRange};
use tracing::{debug, warn};

/// How a partition's records are written so repeated loads converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Records carry a stable natural key; insert-if-absent-else-update.
    UpsertByKey,
    /// No natural keys: delete all rows in the partition's range, then
    /// insert the newly computed rows. Final state depends only on input.
    DeleteRangeInsert,
}

/// Writes one partition's records into the destination.
///
/// Safe to call more than once for the same partition with the same or
/// overlapping data; that property is what makes whole-partition retries
/// and restarts converge instead of duplicate.
pub struct Loader<'a> {
    destination: &'a dyn Destination,
    strategy: LoadStrategy,
    manage_indexes: bool,
}

impl<'a> Loader<'a> {
    /// Creates a loader over `destination`.
    pub fn new(destination: &'a dyn Destination, strategy: LoadStrategy, manage_indexes: bool) -> Self {
        Self {
            destination,
            strategy,
            manage_indexes,
        }
    }

    /// Loads `records` idempotently. Returns rows written.
    ///
    /// `bounds` is required for [`LoadStrategy::DeleteRangeInsert`]; it is
    /// the partition-defining range whose rows get replaced.
    pub fn load(&self, records: &[Record], bounds: Option<&TimeRange>) -> SyncResult<u64> {
        let suspended = self.suspend_indexes();
        let result = self.write(records, bounds);
        if suspended {
            // Best-effort: a failed rebuild degrades throughput, not
            // correctness.
            if let Err(err) = self.destination.rebuild_indexes() {
                warn!(error = %err, "index rebuild failed");
            }
        }
        result
    }

    fn write(&self, records: &[Record], bounds: Option<&TimeRange>) -> SyncResult<u64> {
        match self.strategy {
            LoadStrategy::UpsertByKey => {
                if let Some(missing) = records.iter().position(|r| r.key.is_none()) {
                    return Err(SyncError::fatal(format!(
                        "record {missing} has no key under upsert-by-key strategy"
                    )));
                }
                if records.is_empty() {
                    return Ok(0);
                }
                let written = self.destination.upsert(records)?;
                debug!(rows = written, "upserted partition");
                Ok(written)
            }
            LoadStrategy::DeleteRangeInsert => {
                let range = bounds.ok_or_else(|| {
                    SyncError::fatal("delete-range-then-insert requires partition bounds")
                })?;
                // Replace even when the input is empty: an empty partition
                // must converge to an empty range.
                let deleted = self.destination.delete_range(range)?;
                let written = self.destination.insert(records)?;
                debug!(rows = written, deleted, range = %range, "replaced partition range");
                Ok(written)
            }
        }
    }

    fn suspend_indexes(&self) -> bool {
        if !self.manage_indexes {
            return false;
        }
        match self.destination.suspend_indexes() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "index suspension failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    /// Minimal keyed destination for loader-level tests.
    #[derive(Default)]
    struct KeyedDest {
        rows: Mutex<BTreeMap<String, Record>>,
        fail_rebuild: bool,
        suspend_calls: Mutex<u32>,
    }

    impl Destination for KeyedDest {
        fn upsert(&self, records: &[Record]) -> SyncResult<u64> {
            let mut rows = self.rows.lock();
            for r in records {
                let key = r.key.clone().ok_or_else(|| SyncError::fatal("no key"))?;
                rows.insert(key, r.clone());
            }
            Ok(records.len() as u64)
        }

        fn insert(&self, records: &[Record]) -> SyncResult<u64> {
            let mut rows = self.rows.lock();
            let base = rows.len();
            for (i, r) in records.iter().enumerate() {
                rows.insert(format!("row-{}", base + i), r.clone());
            }
            Ok(records.len() as u64)
        }

        fn delete_range(&self, range: &TimeRange) -> SyncResult<u64> {
            let mut rows = self.rows.lock();
            let before = rows.len();
            rows.retain(|_, r| r.timestamp.map_or(true, |ts| !range.contains(ts)));
            Ok((before - rows.len()) as u64)
        }

        fn count_range(&self, range: &TimeRange) -> SyncResult<u64> {
            let rows = self.rows.lock();
            Ok(rows
                .values()
                .filter(|r| r.timestamp.map_or(false, |ts| range.contains(ts)))
                .count() as u64)
        }

        fn suspend_indexes(&self) -> SyncResult<()> {
            *self.suspend_calls.lock() += 1;
            Ok(())
        }

        fn rebuild_indexes(&self) -> SyncResult<()> {
            if self.fail_rebuild {
                Err(SyncError::server(500, "rebuild failed"))
            } else {
                Ok(())
            }
        }
    }

    fn keyed_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::keyed(format!("k{i}"), serde_json::json!({ "n": i })))
            .collect()
    }

    #[test]
    fn upsert_twice_converges() {
        let dest = KeyedDest::default();
        let loader = Loader::new(&dest, LoadStrategy::UpsertByKey, false);
        let records = keyed_records(50);

        assert_eq!(loader.load(&records, None).unwrap(), 50);
        assert_eq!(loader.load(&records, None).unwrap(), 50);
        // 50 rows, not 100.
        assert_eq!(dest.rows.lock().len(), 50);
    }

    #[test]
    fn upsert_rejects_keyless_records() {
        let dest = KeyedDest::default();
        let loader = Loader::new(&dest, LoadStrategy::UpsertByKey, false);
        let records = vec![Record::unkeyed(serde_json::json!(1))];

        let err = loader.load(&records, None).unwrap_err();
        assert!(matches!(err, SyncError::Fatal { .. }));
        assert!(dest.rows.lock().is_empty());
    }

    #[test]
    fn delete_range_insert_twice_converges() {
        let dest = KeyedDest::default();
        let loader = Loader::new(&dest, LoadStrategy::DeleteRangeInsert, false);

        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let records: Vec<Record> = (0..20)
            .map(|i| Record::unkeyed(serde_json::json!({ "n": i })).with_timestamp(ts))
            .collect();

        assert_eq!(loader.load(&records, Some(&range)).unwrap(), 20);
        assert_eq!(loader.load(&records, Some(&range)).unwrap(), 20);
        assert_eq!(dest.count_range(&range).unwrap(), 20);
    }

    #[test]
    fn delete_range_insert_requires_bounds() {
        let dest = KeyedDest::default();
        let loader = Loader::new(&dest, LoadStrategy::DeleteRangeInsert, false);
        let err = loader.load(&[], None).unwrap_err();
        assert!(matches!(err, SyncError::Fatal { .. }));
    }

    #[test]
    fn empty_partition_clears_range() {
        let dest = KeyedDest::default();
        let loader = Loader::new(&dest, LoadStrategy::DeleteRangeInsert, false);

        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let records = vec![Record::unkeyed(serde_json::json!(1)).with_timestamp(ts)];

        loader.load(&records, Some(&range)).unwrap();
        assert_eq!(dest.count_range(&range).unwrap(), 1);

        // Re-loading the partition with no input leaves the range empty.
        loader.load(&[], Some(&range)).unwrap();
        assert_eq!(dest.count_range(&range).unwrap(), 0);
    }

    #[test]
    fn rebuild_failure_is_not_fatal() {
        let dest = KeyedDest {
            fail_rebuild: true,
            ..KeyedDest::default()
        };
        let loader = Loader::new(&dest, LoadStrategy::UpsertByKey, true);
        let written = loader.load(&keyed_records(3), None).unwrap();
        assert_eq!(written, 3);
        assert_eq!(*dest.suspend_calls.lock(), 1);
    }
}
