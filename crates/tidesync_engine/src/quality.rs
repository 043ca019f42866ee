//! Post-load invariant checks.

use tidesync_core::{Destination, Partition, SyncResult, TimeRange};

/// Outcome of validating a loaded partition.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Human-readable violation messages; empty means the partition passed.
    pub violations: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no violations were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Validates freshly loaded partitions before the checkpoint advances.
///
/// A violation is a correctness problem, not a transient fault: the job
/// halts with `ERROR` rather than retrying past it.
#[derive(Debug, Clone)]
pub struct QualityGate {
    tolerance: u64,
}

impl QualityGate {
    /// Creates a gate allowing `tolerance` rows of count drift.
    pub fn new(tolerance: u64) -> Self {
        Self { tolerance }
    }

    /// Validates a loaded partition against the counts the run observed.
    pub fn validate(&self, partition: &Partition, expected: u64, written: u64) -> ValidationResult {
        let mut violations = Vec::new();

        if expected.abs_diff(written) > self.tolerance {
            violations.push(format!(
                "row count mismatch in partition {}: expected {expected} rows, loader reported {written}",
                partition.id
            ));
        }

        ValidationResult { violations }
    }

    /// Cross-checks the destination's stored row count for a calendar
    /// partition (random-access mode, delete-range-then-insert loads).
    pub fn validate_range(
        &self,
        destination: &dyn Destination,
        range: &TimeRange,
        expected: u64,
    ) -> SyncResult<ValidationResult> {
        let mut violations = Vec::new();
        let stored = destination.count_range(range)?;
        if expected.abs_diff(stored) > self.tolerance {
            violations.push(format!(
                "destination count mismatch for {range}: expected {expected} rows, found {stored}"
            ));
        }
        Ok(ValidationResult { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_core::Cursor;

    #[test]
    fn exact_match_passes() {
        let gate = QualityGate::new(0);
        let partition = Partition::sequential(1, Cursor::start());
        assert!(gate.validate(&partition, 100, 100).is_ok());
    }

    #[test]
    fn mismatch_reports_counts() {
        let gate = QualityGate::new(0);
        let partition = Partition::sequential(4, Cursor::start());
        let result = gate.validate(&partition, 100, 97);

        assert!(!result.is_ok());
        assert_eq!(result.violations.len(), 1);
        let msg = &result.violations[0];
        assert!(msg.contains("100"));
        assert!(msg.contains("97"));
        assert!(msg.contains("mismatch"));
    }

    #[test]
    fn tolerance_absorbs_small_drift() {
        let gate = QualityGate::new(5);
        let partition = Partition::sequential(1, Cursor::start());
        assert!(gate.validate(&partition, 100, 97).is_ok());
        assert!(!gate.validate(&partition, 100, 90).is_ok());
    }
}
