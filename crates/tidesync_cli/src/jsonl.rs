//! JSONL file connectors.
//!
//! One JSON document per line, in the engine's record shape:
//! `{"key": "...", "timestamp": "...", "payload": {...}}`. These
//! connectors make local pipelines and demos runnable without a real
//! source or warehouse behind them.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tidesync_core::{
    Cursor, Destination, Page, PageSource, RangeSource, Record, SyncError, SyncResult, TimeRange,
};

/// A paged and range-queryable source backed by a JSONL file.
///
/// The whole file is parsed at open. Cursors are decimal record offsets,
/// so resumption survives process restarts as long as the file does not
/// change underneath the job.
#[derive(Debug)]
pub struct JsonlSource {
    records: Vec<Record>,
}

impl JsonlSource {
    /// Opens and parses `path`.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SyncError::fatal(format!("read {}: {e}", path.display())))?;

        let mut records = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| {
                SyncError::fatal(format!("{}:{}: {e}", path.display(), lineno + 1))
            })?;
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Number of records in the file.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the file held no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn offset(cursor: &Cursor) -> SyncResult<usize> {
        if cursor.is_start() {
            return Ok(0);
        }
        cursor
            .as_str()
            .parse()
            .map_err(|_| SyncError::fatal(format!("malformed cursor {cursor}")))
    }
}

impl PageSource for JsonlSource {
    fn fetch_page(&self, cursor: &Cursor, limit: u64) -> SyncResult<Page> {
        let offset = Self::offset(cursor)?;
        if offset >= self.records.len() {
            return Ok(Page::end());
        }
        let end = (offset + limit.max(1) as usize).min(self.records.len());
        let next = if end < self.records.len() {
            Some(Cursor::new(end.to_string()))
        } else {
            None
        };
        Ok(Page::new(self.records[offset..end].to_vec(), next))
    }
}

impl RangeSource for JsonlSource {
    fn fetch_range(&self, range: &TimeRange) -> SyncResult<Vec<Record>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.timestamp.is_some_and(|ts| range.contains(ts)))
            .cloned()
            .collect())
    }
}

/// A warehouse destination backed by a JSONL file.
///
/// Keyed records live in a map so upserts converge; unkeyed records live
/// in a row log for delete-range-then-insert loads. Every write persists
/// the full state through a temporary sibling and rename, matching the
/// checkpoint store's crash discipline.
pub struct JsonlDestination {
    path: PathBuf,
    keyed: Mutex<BTreeMap<String, Record>>,
    rows: Mutex<Vec<Record>>,
}

impl JsonlDestination {
    /// Opens `path`, loading any rows a previous run already wrote.
    pub fn open(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let mut keyed = BTreeMap::new();
        let mut rows = Vec::new();

        if path.exists() {
            let text = fs::read_to_string(&path)
                .map_err(|e| SyncError::fatal(format!("read {}: {e}", path.display())))?;
            for (lineno, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: Record = serde_json::from_str(line).map_err(|e| {
                    SyncError::fatal(format!("{}:{}: {e}", path.display(), lineno + 1))
                })?;
                match &record.key {
                    Some(key) => {
                        keyed.insert(key.clone(), record);
                    }
                    None => rows.push(record),
                }
            }
        }

        Ok(Self {
            path,
            keyed: Mutex::new(keyed),
            rows: Mutex::new(rows),
        })
    }

    /// Total rows currently stored.
    pub fn row_count(&self) -> u64 {
        (self.keyed.lock().len() + self.rows.lock().len()) as u64
    }

    fn persist(&self) -> SyncResult<()> {
        let mut out = String::new();
        for record in self.keyed.lock().values() {
            self.append_line(&mut out, record)?;
        }
        for record in self.rows.lock().iter() {
            self.append_line(&mut out, record)?;
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, out)
            .map_err(|e| SyncError::fatal(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| SyncError::fatal(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }

    fn append_line(&self, out: &mut String, record: &Record) -> SyncResult<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| SyncError::fatal(format!("encode record: {e}")))?;
        out.push_str(&line);
        out.push('\n');
        Ok(())
    }
}

impl Destination for JsonlDestination {
    fn upsert(&self, records: &[Record]) -> SyncResult<u64> {
        {
            let mut keyed = self.keyed.lock();
            for record in records {
                let key = record
                    .key
                    .clone()
                    .ok_or_else(|| SyncError::fatal("upsert of keyless record"))?;
                keyed.insert(key, record.clone());
            }
        }
        self.persist()?;
        Ok(records.len() as u64)
    }

    fn insert(&self, records: &[Record]) -> SyncResult<u64> {
        self.rows.lock().extend(records.iter().cloned());
        self.persist()?;
        Ok(records.len() as u64)
    }

    fn delete_range(&self, range: &TimeRange) -> SyncResult<u64> {
        let removed = {
            let mut rows = self.rows.lock();
            let before = rows.len();
            rows.retain(|r| !r.timestamp.is_some_and(|ts| range.contains(ts)));
            before - rows.len()
        };
        self.persist()?;
        Ok(removed as u64)
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
}
