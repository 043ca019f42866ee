//! Connector traits: the boundary between the engine and the outside world.
//!
//! Sources and destinations are collaborators supplied by the caller. They
//! own all wire formats and SQL dialects; the engine sees only [`Record`]s,
//! cursors, and time ranges. Connectors classify their own failures by
//! constructing the matching [`crate::SyncError`] variant.

use crate::error::SyncResult;
use crate::types::{Cursor, Record, TimeRange};

/// One page of records from a sequential source.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Records in source order.
    pub records: Vec<Record>,
    /// Cursor for the next page; `None` when the source is exhausted.
    pub next_cursor: Option<Cursor>,
}

impl Page {
    /// Creates a page.
    pub fn new(records: Vec<Record>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    /// An empty, exhausted page.
    #[must_use]
    pub fn end() -> Self {
        Self::default()
    }

    /// Number of records in the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the page carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A source that only supports "give me the next page after cursor X".
///
/// Cursors are strictly sequential, so only one partition can be in
/// flight at a time against such a source.
pub trait PageSource: Send + Sync {
    /// Fetches up to `limit` records after `cursor`.
    fn fetch_page(&self, cursor: &Cursor, limit: u64) -> SyncResult<Page>;
}

/// A source that supports random-access range queries.
///
/// Ranges are independent, so partitions over disjoint ranges may be
/// fetched concurrently by separate workers.
pub trait RangeSource: Send + Sync {
    /// Fetches every record whose timestamp falls inside `range`.
    fn fetch_range(&self, range: &TimeRange) -> SyncResult<Vec<Record>>;
}

/// A warehouse destination.
///
/// Implementations must make `upsert` and the `delete_range` + `insert`
/// pair atomic per call; the engine relies on that for partition-level
/// idempotence.
pub trait Destination: Send + Sync {
    /// Inserts-or-updates records by their natural key. Returns rows written.
    fn upsert(&self, records: &[Record]) -> SyncResult<u64>;

    /// Appends records without key semantics. Returns rows written.
    fn insert(&self, records: &[Record]) -> SyncResult<u64>;

    /// Deletes every row whose partition-defining range matches `range`.
    /// Returns rows deleted.
    fn delete_range(&self, range: &TimeRange) -> SyncResult<u64>;

    /// Counts rows currently stored for `range`.
    fn count_range(&self, range: &TimeRange) -> SyncResult<u64>;

    /// Optionally suspends indexes before a bulk load. Best-effort.
    fn suspend_indexes(&self) -> SyncResult<()> {
        Ok(())
    }

    /// Optionally rebuilds indexes after a bulk load. Best-effort.
    fn rebuild_indexes(&self) -> SyncResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_end_is_exhausted() {
        let page = Page::end();
        assert!(page.is_empty());
        assert!(page.next_cursor.is_none());
        assert_eq!(page.len(), 0);
    }

    #[test]
    fn page_carries_cursor() {
        let page = Page::new(
            vec![Record::unkeyed(serde_json::json!(1))],
            Some(Cursor::new("next")),
        );
        assert_eq!(page.len(), 1);
        assert_eq!(page.next_cursor, Some(Cursor::new("next")));
    }
}
