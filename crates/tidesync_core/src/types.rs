//! Core type definitions for TideSync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque pointer into a source's ordering.
///
/// A cursor might be a timestamp, a page token, or an offset; the engine
/// never interprets it, only stores it and hands it back to the source.
/// Ordering is defined entirely by the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// Creates a cursor from a source-defined token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The cursor marking the start of the stream.
    #[must_use]
    pub fn start() -> Self {
        Self(String::new())
    }

    /// Returns true if this cursor marks the start of the stream.
    #[must_use]
    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_start() {
            f.write_str("<start>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for Cursor {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// A half-open calendar interval `[start, end)`.
///
/// Used both as a job's sync window and as the bounds of a calendar
/// partition. The label doubles as the partition's identity key in the
/// checkpoint, so it must be stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a new range. `end` must not precede `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start <= end, "time range end precedes start");
        Self { start, end }
    }

    /// Returns true if `ts` falls inside the range.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// Length of the range.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Stable identity label, e.g. `2024-03-01T00:00:00Z/2024-04-01T00:00:00Z`.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// An already-mapped destination row.
///
/// Produced by the business-mapping collaborator; the engine only reads
/// the key (idempotent upsert identity) and the event timestamp (window
/// coverage tracking). The payload is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable natural or composite key, when the destination table has one.
    pub key: Option<String>,
    /// Event timestamp, when the source carries one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque mapped row content.
    pub payload: serde_json::Value,
}

impl Record {
    /// Creates a keyed record.
    pub fn keyed(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: Some(key.into()),
            timestamp: None,
            payload,
        }
    }

    /// Creates an unkeyed record (delete-range-then-insert destinations).
    pub fn unkeyed(payload: serde_json::Value) -> Self {
        Self {
            key: None,
            timestamp: None,
            payload,
        }
    }

    /// Attaches an event timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }
}
