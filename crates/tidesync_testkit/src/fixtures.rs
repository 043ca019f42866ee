//! Scripted connectors and fixture helpers.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tidesync_core::{
    Cursor, Destination, Page, PageSource, RangeSource, Record, SyncError, SyncResult, TimeRange,
};

/// A failure a scripted connector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transient network failure.
    Transient,
    /// Rate limit with an optional retry-after hint, in milliseconds.
    RateLimited(Option<u64>),
    /// Server-side failure with a status code.
    Server(u16),
    /// Non-retryable failure.
    Fatal,
}

impl FailureKind {
    /// Builds the corresponding error.
    pub fn to_error(self) -> SyncError {
        match self {
            FailureKind::Transient => SyncError::transient("scripted connection reset"),
            FailureKind::RateLimited(hint_ms) => SyncError::rate_limited(
                "scripted rate limit",
                hint_ms.map(Duration::from_millis),
            ),
            FailureKind::Server(status) => SyncError::server(status, "scripted server error"),
            FailureKind::Fatal => SyncError::fatal("scripted fatal error"),
        }
    }
}

/// A deterministic source serving pre-sliced pages.
///
/// Page boundaries are fixed at construction; the engine's `limit`
/// argument is ignored so tests control pagination exactly. Cursors are
/// `p{index}` tokens. Failures can be scripted per page index and are
/// consumed one per fetch attempt.
pub struct ScriptedSource {
    pages: Vec<Vec<Record>>,
    page_latency: Duration,
    failures: Mutex<HashMap<usize, VecDeque<FailureKind>>>,
    range_failures: Mutex<HashMap<String, VecDeque<FailureKind>>>,
    fetches: AtomicU64,
}

impl ScriptedSource {
    /// Creates a source serving `records` in pages of `page_size`.
    pub fn paged(records: Vec<Record>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let pages = records
            .chunks(page_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        Self {
            pages,
            page_latency: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            range_failures: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Creates a source from explicit pages.
    pub fn from_pages(pages: Vec<Vec<Record>>) -> Self {
        Self {
            pages,
            page_latency: Duration::ZERO,
            failures: Mutex::new(HashMap::new()),
            range_failures: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Adds a simulated latency to every page fetch.
    #[must_use]
    pub fn with_page_latency(mut self, latency: Duration) -> Self {
        self.page_latency = latency;
        self
    }

    /// Scripts `times` consecutive failures for fetches of page `index`.
    pub fn fail_page(&self, index: usize, kind: FailureKind, times: u32) {
        let mut failures = self.failures.lock();
        let queue = failures.entry(index).or_default();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    /// Scripts `times` consecutive failures for range fetches whose
    /// range label equals `label`.
    pub fn fail_range(&self, label: impl Into<String>, kind: FailureKind, times: u32) {
        let mut failures = self.range_failures.lock();
        let queue = failures.entry(label.into()).or_default();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    /// Number of fetch attempts made, including failed ones.
    pub fn fetch_calls(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of pages this source serves.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_index(cursor: &Cursor) -> SyncResult<usize> {
        if cursor.is_start() {
            return Ok(0);
        }
        cursor
            .as_str()
            .strip_prefix('p')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| SyncError::fatal(format!("unknown cursor {cursor}")))
    }
}

impl PageSource for ScriptedSource {
    fn fetch_page(&self, cursor: &Cursor, _limit: u64) -> SyncResult<Page> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let index = Self::page_index(cursor)?;

        if let Some(kind) = self
            .failures
            .lock()
            .get_mut(&index)
            .and_then(|queue| queue.pop_front())
        {
            return Err(kind.to_error());
        }

        if !self.page_latency.is_zero() {
            std::thread::sleep(self.page_latency);
        }

        if index >= self.pages.len() {
            return Ok(Page::end());
        }
        let records = self.pages[index].clone();
        let next = if index + 1 < self.pages.len() {
            Some(Cursor::new(format!("p{}", index + 1)))
        } else {
            None
        };
        Ok(Page::new(records, next))
    }
}

impl RangeSource for ScriptedSource {
    fn fetch_range(&self, range: &TimeRange) -> SyncResult<Vec<Record>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(kind) = self
            .range_failures
            .lock()
            .get_mut(&range.label())
            .and_then(|queue| queue.pop_front())
        {
            return Err(kind.to_error());
        }

        if !self.page_latency.is_zero() {
            std::thread::sleep(self.page_latency);
        }

        Ok(self
            .pages
            .iter()
            .flatten()
            .filter(|r| r.timestamp.is_some_and(|ts| range.contains(ts)))
            .cloned()
            .collect())
    }
}

/// An in-memory warehouse destination.
///
/// Keyed upserts land in a map; unkeyed inserts land in a row log.
/// Scripted insert failures exercise the whole-partition retry path, and
/// index rebuilds can be made to fail to cover the best-effort path.
#[derive(Default)]
pub struct MemoryDestination {
    keyed: Mutex<BTreeMap<String, Record>>,
    rows: Mutex<Vec<Record>>,
    insert_failures: Mutex<VecDeque<FailureKind>>,
    fail_rebuild: Mutex<bool>,
    suspend_calls: AtomicU64,
    rebuild_calls: AtomicU64,
}

impl MemoryDestination {
    /// Creates an empty destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `times` consecutive failures for upcoming writes.
    pub fn fail_writes(&self, kind: FailureKind, times: u32) {
        let mut queue = self.insert_failures.lock();
        for _ in 0..times {
            queue.push_back(kind);
        }
    }

    /// Makes subsequent index rebuilds fail.
    pub fn fail_rebuild(&self) {
        *self.fail_rebuild.lock() = true;
    }

    /// Total rows stored, keyed and unkeyed.
    pub fn row_count(&self) -> u64 {
        (self.keyed.lock().len() + self.rows.lock().len()) as u64
    }

    /// Rows stored under a given key.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.keyed.lock().get(key).cloned()
    }

    /// Number of index suspend calls observed.
    pub fn suspend_calls(&self) -> u64 {
        self.suspend_calls.load(Ordering::SeqCst)
    }

    /// Number of index rebuild calls observed.
    pub fn rebuild_calls(&self) -> u64 {
        self.rebuild_calls.load(Ordering::SeqCst)
    }

    fn check_write_failure(&self) -> SyncResult<()> {
        if let Some(kind) = self.insert_failures.lock().pop_front() {
            return Err(kind.to_error());
        }
        Ok(())
    }
}

impl Destination for MemoryDestination {
    fn upsert(&self, records: &[Record]) -> SyncResult<u64> {
        self.check_write_failure()?;
        let mut keyed = self.keyed.lock();
        for record in records {
            let key = record
                .key
                .clone()
                .ok_or_else(|| SyncError::fatal("upsert of keyless record"))?;
            keyed.insert(key, record.clone());
        }
        Ok(records.len() as u64)
    }

    fn insert(&self, records: &[Record]) -> SyncResult<u64> {
        self.check_write_failure()?;
        self.rows.lock().extend(records.iter().cloned());
        Ok(records.len() as u64)
    }

    fn delete_range(&self, range: &TimeRange) -> SyncResult<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| !r.timestamp.is_some_and(|ts| range.contains(ts)));
        Ok((before - rows.len()) as u64)
    }

    fn count_range(&self, range: &TimeRange) -> SyncResult<u64> {
        let in_rows = self
            .rows
            .lock()
            .iter()
            .filter(|r| r.timestamp.is_some_and(|ts| range.contains(ts)))
            .count();
        let in_keyed = self
            .keyed
            .lock()
            .values()
            .filter(|r| r.timestamp.is_some_and(|ts| range.contains(ts)))
            .count();
        Ok((in_rows + in_keyed) as u64)
    }

    fn suspend_indexes(&self) -> SyncResult<()> {
        self.suspend_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rebuild_indexes(&self) -> SyncResult<()> {
        self.rebuild_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_rebuild.lock() {
            Err(SyncError::server(500, "scripted rebuild failure"))
        } else {
            Ok(())
        }
    }
}

/// Builds `n` keyed records with timestamps advancing by `step` from `start`.
pub fn timestamped_records(
    n: usize,
    start: DateTime<Utc>,
    step: chrono::Duration,
) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let ts = start + step * i as i32;
            Record::keyed(format!("rec-{i}"), serde_json::json!({ "seq": i }))
                .with_timestamp(ts)
        })
        .collect()
}

/// Shorthand for a UTC timestamp.
pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_source_pages_in_order() {
        let records = timestamped_records(25, utc(2024, 1, 1, 0), chrono::Duration::minutes(1));
        let source = ScriptedSource::paged(records, 10);
        assert_eq!(source.page_count(), 3);

        let p0 = source.fetch_page(&Cursor::start(), 10).unwrap();
        assert_eq!(p0.len(), 10);
        let c1 = p0.next_cursor.unwrap();
        let p1 = source.fetch_page(&c1, 10).unwrap();
        assert_eq!(p1.len(), 10);
        let c2 = p1.next_cursor.unwrap();
        let p2 = source.fetch_page(&c2, 10).unwrap();
        assert_eq!(p2.len(), 5);
        assert!(p2.next_cursor.is_none());

        assert_eq!(source.fetch_calls(), 3);
    }

    #[test]
    fn scripted_failures_consume_in_order() {
        let records = timestamped_records(5, utc(2024, 1, 1, 0), chrono::Duration::minutes(1));
        let source = ScriptedSource::paged(records, 5);
        source.fail_page(0, FailureKind::Transient, 2);

        assert!(source.fetch_page(&Cursor::start(), 5).is_err());
        assert!(source.fetch_page(&Cursor::start(), 5).is_err());
        assert!(source.fetch_page(&Cursor::start(), 5).is_ok());
    }

    #[test]
    fn range_fetch_filters_by_timestamp() {
        let records = timestamped_records(48, utc(2024, 1, 1, 0), chrono::Duration::hours(1));
        let source = ScriptedSource::paged(records, 10);

        let day2 = TimeRange::new(utc(2024, 1, 2, 0), utc(2024, 1, 3, 0));
        let found = source.fetch_range(&day2).unwrap();
        assert_eq!(found.len(), 24);
    }

    #[test]
    fn memory_destination_upsert_converges() {
        let dest = MemoryDestination::new();
        let records = timestamped_records(50, utc(2024, 1, 1, 0), chrono::Duration::minutes(1));
        dest.upsert(&records).unwrap();
        dest.upsert(&records).unwrap();
        assert_eq!(dest.row_count(), 50);
    }

    #[test]
    fn memory_destination_scripted_write_failure() {
        let dest = MemoryDestination::new();
        dest.fail_writes(FailureKind::Transient, 1);
        let records = timestamped_records(2, utc(2024, 1, 1, 0), chrono::Duration::minutes(1));

        assert!(dest.upsert(&records).is_err());
        assert!(dest.upsert(&records).is_ok());
    }
}
