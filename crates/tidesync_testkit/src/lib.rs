//! # TideSync Testkit
//!
//! Test utilities for TideSync.
//!
//! This crate provides:
//! - `ScriptedSource`: a deterministic paged/range source with scripted
//!   failures and per-page latency
//! - `MemoryDestination`: an in-memory warehouse with assertion helpers
//! - Record and fixture builders
//! - Property-based test generators using proptest

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use fixtures::{FailureKind, MemoryDestination, ScriptedSource};
pub use generators::{duration_sequence_strategy, duration_strategy, record_batch_strategy};
