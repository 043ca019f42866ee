//! # TideSync Engine
//!
//! Resumable, adaptively-paced, partition-parallel synchronization.
//!
//! This crate provides:
//! - Adaptive pacing (proportional control over partition sizes)
//! - A retrying fetcher with exponential backoff, rate-limit hints, and
//!   jitter
//! - Sequential-cursor and calendar partition schedulers
//! - A bounded worker pool for random-access sources
//! - Idempotent partition loads (upsert-by-key or
//!   delete-range-then-insert)
//! - A quality gate run before any checkpoint advances
//! - The orchestrator tying it all into one job lifecycle
//!
//! ## Architecture
//!
//! The orchestrator drives a loop of fetch → accumulate → load →
//! validate → checkpoint, adjusting the next partition's size from the
//! last partition's wall-clock time. The checkpoint is the only durable
//! state; it advances strictly after validation, so a crash anywhere in
//! the loop restarts the job from its last safe position.
//!
//! ## Key invariants
//!
//! - The checkpoint cursor never moves backward
//! - Partition loads converge under repetition (idempotence)
//! - Transient failures never surface past the retrying fetcher unless
//!   the attempt budget is exhausted
//! - The pacing controller never emits a size outside its bounds

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod loader;
mod orchestrator;
mod pacing;
mod pool;
mod quality;
mod retry;
mod scheduler;

pub use config::{JobConfig, PacingConfig, PartitionLength, RetryConfig, SyncMode};
pub use loader::{LoadStrategy, Loader};
pub use orchestrator::{CalendarContext, Orchestrator, SequentialContext, SyncSummary};
pub use pacing::{LatencyWindow, PacingController};
pub use pool::{CalendarPool, PoolOutcome};
pub use quality::{QualityGate, ValidationResult};
pub use retry::{FetchOutcome, Retrier};
pub use scheduler::{slice_window, AccumulatedPartition, SequentialScheduler, SmartExit};
