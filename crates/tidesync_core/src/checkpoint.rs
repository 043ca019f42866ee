//! Durable checkpoint records and their persistence.

use crate::error::{SyncError, SyncResult};
use crate::types::Cursor;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Job lifecycle status, persisted in the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// No progress yet, or checkpoint explicitly cleared.
    Ready,
    /// At least one partition validated this run.
    InProgress,
    /// Source exhausted and final checkpoint written.
    Completed,
    /// Caller cancellation; restart is always safe.
    Interrupted,
    /// Quality violation or unrecoverable failure; operator required.
    Error,
}

impl JobStatus {
    /// Returns true if a new run may start from this status.
    pub fn can_start(self) -> bool {
        // ERROR is resumable too, once the operator fixes the cause;
        // re-running is the documented recovery action.
        matches!(
            self,
            JobStatus::Ready | JobStatus::InProgress | JobStatus::Interrupted | JobStatus::Error
        )
    }

    /// Returns true if the job reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Interrupted | JobStatus::Error
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Ready => "READY",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Interrupted => "INTERRUPTED",
            JobStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Durable record of a job's last validated progress.
///
/// Mutated only by the orchestrator, and only after a partition reaches
/// `Validated`. A crash before validation leaves the checkpoint at the
/// prior safe position, so restart is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Job name; the persistence key.
    pub job: String,
    /// Last validated cursor. Never moves backward.
    pub cursor: Cursor,
    /// Current job status.
    pub status: JobStatus,
    /// Cumulative records fetched from the source.
    pub records_fetched: u64,
    /// Cumulative records written to the destination.
    pub records_written: u64,
    /// Number of partitions validated across all runs.
    pub partitions_validated: u64,
    /// Current adaptive partition size, carried across restarts.
    pub adaptive_size: u64,
    /// Labels of completed calendar partitions (random-access mode).
    #[serde(default)]
    pub completed_windows: BTreeSet<String>,
    /// Diagnostic for the last error, if any.
    pub last_error: Option<String>,
    /// When the checkpoint was first created.
    pub created_at: DateTime<Utc>,
    /// When the checkpoint was last written.
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Creates a fresh checkpoint for `job` with the given starting size.
    pub fn new(job: impl Into<String>, initial_size: u64) -> Self {
        let now = Utc::now();
        Self {
            job: job.into(),
            cursor: Cursor::start(),
            status: JobStatus::Ready,
            records_fetched: 0,
            records_written: 0,
            partitions_validated: 0,
            adaptive_size: initial_size,
            completed_windows: BTreeSet::new(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advances the cursor past a validated partition.
    ///
    /// Callers must only invoke this after the quality gate passed.
    pub fn advance(&mut self, cursor: Cursor, fetched: u64, written: u64) {
        self.cursor = cursor;
        self.records_fetched += fetched;
        self.records_written += written;
        self.partitions_validated += 1;
        self.touch();
    }

    /// Records a completed calendar partition.
    pub fn record_window(&mut self, label: impl Into<String>, fetched: u64, written: u64) {
        self.completed_windows.insert(label.into());
        self.records_fetched += fetched;
        self.records_written += written;
        self.partitions_validated += 1;
        self.touch();
    }

    /// Returns true if a calendar partition was already completed.
    pub fn is_window_complete(&self, label: &str) -> bool {
        self.completed_windows.contains(label)
    }

    /// Sets the job status and clears any stale diagnostic on non-error states.
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        if status != JobStatus::Error {
            self.last_error = None;
        }
        self.touch();
    }

    /// Transitions to `Error` with a diagnostic.
    pub fn set_error(&mut self, diagnostic: impl Into<String>) {
        self.status = JobStatus::Error;
        self.last_error = Some(diagnostic.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Durable key/value store of job checkpoints.
///
/// `save` must be an atomic upsert keyed by job name: concurrent partition
/// completions are serialized by the caller, but a crash mid-save must
/// never leave a torn record.
pub trait CheckpointStore: Send + Sync {
    /// Loads the checkpoint for `job`, if one exists.
    fn load(&self, job: &str) -> SyncResult<Option<Checkpoint>>;

    /// Atomically upserts a checkpoint.
    fn save(&self, checkpoint: &Checkpoint) -> SyncResult<()>;

    /// Removes the checkpoint for `job`, if any.
    fn clear(&self, job: &str) -> SyncResult<()>;
}

/// An in-memory checkpoint store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, job: &str) -> SyncResult<Option<Checkpoint>> {
        Ok(self.records.read().get(job).cloned())
    }

    fn save(&self, checkpoint: &Checkpoint) -> SyncResult<()> {
        self.records
            .write()
            .insert(checkpoint.job.clone(), checkpoint.clone());
        Ok(())
    }

    fn clear(&self, job: &str) -> SyncResult<()> {
        self.records.write().remove(job);
        Ok(())
    }
}

/// A file-backed checkpoint store: one JSON document per job.
///
/// Saves write to a temporary sibling and rename into place, so a crash
/// mid-write leaves either the old record or the new one, never a torn
/// file.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| SyncError::checkpoint(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Returns the path of the checkpoint file for `job`.
    ///
    /// Job names are operator-chosen; unsafe characters are replaced and
    /// a digest of the raw name is appended so sanitized names (`a/b`,
    /// `a_b`) cannot collide on the same file.
    pub fn path_for(&self, job: &str) -> PathBuf {
        let safe: String = job
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if safe == job {
            self.dir.join(format!("{safe}.json"))
        } else {
            self.dir
                .join(format!("{safe}-{:08x}.json", Self::digest(job)))
        }
    }

    // FNV-1a, stable across processes and platforms.
    fn digest(name: &str) -> u32 {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in name.bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        hash
    }

    fn read_file(path: &Path) -> SyncResult<Checkpoint> {
        let bytes = fs::read(path)
            .map_err(|e| SyncError::checkpoint(format!("read {}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::checkpoint(format!("decode {}: {e}", path.display())))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, job: &str) -> SyncResult<Option<Checkpoint>> {
        let path = self.path_for(job);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn save(&self, checkpoint: &Checkpoint) -> SyncResult<()> {
        let path = self.path_for(&checkpoint.job);
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| SyncError::checkpoint(format!("encode checkpoint: {e}")))?;
        fs::write(&tmp, bytes)
            .map_err(|e| SyncError::checkpoint(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| SyncError::checkpoint(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    fn clear(&self, job: &str) -> SyncResult<()> {
        let path = self.path_for(job);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::checkpoint(format!(
                "remove {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions() {
        assert!(JobStatus::Ready.can_start());
        assert!(JobStatus::InProgress.can_start());
        assert!(JobStatus::Interrupted.can_start());
        assert!(JobStatus::Error.can_start());
        assert!(!JobStatus::Completed.can_start());

        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Ready.is_terminal());
    }

    #[test]
    fn advance_accumulates() {
        let mut cp = Checkpoint::new("orders", 500);
        cp.advance(Cursor::new("p1"), 100, 100);
        cp.advance(Cursor::new("p2"), 50, 48);

        assert_eq!(cp.cursor, Cursor::new("p2"));
        assert_eq!(cp.records_fetched, 150);
        assert_eq!(cp.records_written, 148);
        assert_eq!(cp.partitions_validated, 2);
    }

    #[test]
    fn window_bookkeeping() {
        let mut cp = Checkpoint::new("facts", 500);
        cp.record_window("2024-01", 10, 10);
        assert!(cp.is_window_complete("2024-01"));
        assert!(!cp.is_window_complete("2024-02"));
    }

    #[test]
    fn error_diagnostic_cleared_on_recovery() {
        let mut cp = Checkpoint::new("orders", 500);
        cp.set_error("count mismatch");
        assert_eq!(cp.status, JobStatus::Error);
        assert!(cp.last_error.is_some());

        cp.set_status(JobStatus::InProgress);
        assert!(cp.last_error.is_none());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("orders").unwrap().is_none());

        let cp = Checkpoint::new("orders", 500);
        store.save(&cp).unwrap();
        let loaded = store.load("orders").unwrap().unwrap();
        assert_eq!(loaded.job, "orders");

        store.clear("orders").unwrap();
        assert!(store.load("orders").unwrap().is_none());
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();

        let mut cp = Checkpoint::new("orders", 500);
        cp.advance(Cursor::new("p7"), 700, 700);
        store.save(&cp).unwrap();

        let loaded = store.load("orders").unwrap().unwrap();
        assert_eq!(loaded.cursor, Cursor::new("p7"));
        assert_eq!(loaded.records_fetched, 700);

        // Saving again overwrites in place.
        cp.advance(Cursor::new("p8"), 100, 100);
        store.save(&cp).unwrap();
        let loaded = store.load("orders").unwrap().unwrap();
        assert_eq!(loaded.cursor, Cursor::new("p8"));

        store.clear("orders").unwrap();
        assert!(store.load("orders").unwrap().is_none());
        // Clearing a missing checkpoint is not an error.
        store.clear("orders").unwrap();
    }

    #[test]
    fn file_store_sanitizes_job_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();
        let path = store.path_for("orders/../../etc");
        assert!(path.starts_with(dir.path()));
        assert!(!path.to_string_lossy().contains(".."));
    }

    #[test]
    fn sanitized_job_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::open(dir.path()).unwrap();

        // Same sanitized form, different raw names.
        assert_ne!(store.path_for("a/b"), store.path_for("a_b"));
        // Stable across calls.
        assert_eq!(store.path_for("a/b"), store.path_for("a/b"));
        // Clean names keep their plain filename.
        assert_eq!(
            store.path_for("orders"),
            dir.path().join("orders.json")
        );

        // Round-trip through the disambiguated path.
        let cp = Checkpoint::new("a/b", 100);
        store.save(&cp).unwrap();
        assert!(store.load("a/b").unwrap().is_some());
        assert!(store.load("a_b").unwrap().is_none());
    }

    #[test]
    fn file_store_missing_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileCheckpointStore::open(&nested).unwrap();
        store.save(&Checkpoint::new("j", 1)).unwrap();
        assert!(store.load("j").unwrap().is_some());
    }
}
