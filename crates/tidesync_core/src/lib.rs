//! # TideSync Core
//!
//! Data model and interface boundary for the TideSync engine.
//!
//! This crate provides:
//! - `Cursor`, `Record`, and `TimeRange` primitives
//! - `Partition` units of work and their lifecycle
//! - `Checkpoint` records and the `CheckpointStore` trait
//! - Connector traits (`PageSource`, `RangeSource`, `Destination`)
//! - The `SyncError` taxonomy with retry classification
//!
//! This is a pure model crate: no pacing, retry, or scheduling logic
//! lives here. The engine only ever handles opaque, already-mapped
//! records plus their partition and key metadata; the business mapping
//! from raw source data to [`Record`]s is an external collaborator.
//!
//! ## Key invariants
//!
//! - A checkpoint's cursor advances only after a partition is validated
//! - Checkpoint saves are atomic upserts keyed by job name
//! - Cursors are opaque; the engine never interprets their contents

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod connector;
mod error;
mod partition;
mod types;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, JobStatus, MemoryCheckpointStore};
pub use connector::{Destination, Page, PageSource, RangeSource};
pub use error::{FailureClass, SyncError, SyncResult};
pub use partition::{Partition, PartitionStatus};
pub use types::{Cursor, Record, TimeRange};
