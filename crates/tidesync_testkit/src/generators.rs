//! Property-based test generators using proptest.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::time::Duration;
use tidesync_core::Record;

/// Strategy for a single observed duration, up to `max_secs`.
pub fn duration_strategy(max_secs: u64) -> impl Strategy<Value = Duration> {
    (0..=max_secs.max(1) * 1_000).prop_map(Duration::from_millis)
}

/// Strategy for a sequence of observed durations.
pub fn duration_sequence_strategy(
    max_secs: u64,
    max_len: usize,
) -> impl Strategy<Value = Vec<Duration>> {
    prop::collection::vec(duration_strategy(max_secs), 0..max_len.max(1))
}

/// Strategy for a batch of keyed, timestamped records within 2024.
pub fn record_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
    let record = (0u64..100_000, 0i64..365 * 24 * 3_600).prop_map(|(n, offset)| {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        Record::keyed(format!("rec-{n}"), serde_json::json!({ "seq": n }))
            .with_timestamp(base + chrono::Duration::seconds(offset))
    });
    prop::collection::vec(record, 0..max_len.max(1))
}
