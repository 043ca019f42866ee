//! Configuration for sync jobs.

use crate::loader::LoadStrategy;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// How the scheduler decomposes the sync window, selected by source capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Source only supports "next page after cursor X". One partition in
    /// flight at a time, delimited by the accumulation policy.
    Sequential,
    /// Source supports range queries. Fixed calendar partitions executed
    /// by a bounded worker pool.
    Calendar,
}

/// How a calendar window is sliced into partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionLength {
    /// One partition per calendar month.
    Monthly,
    /// Fixed-duration slices, for fine-grained windows and tests.
    Fixed(chrono::Duration),
}

/// Configuration for the adaptive pacing controller.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Wall-clock duration a partition should aim for.
    pub target: Duration,
    /// Multiplier applied when partitions run fast.
    pub grow_ratio: f64,
    /// Multiplier applied when partitions run slow.
    pub shrink_ratio: f64,
    /// Shrink once duration exceeds `high_watermark × target`.
    pub high_watermark: f64,
    /// Grow once duration falls below `low_watermark × target`.
    pub low_watermark: f64,
    /// Smallest permitted partition size, in records.
    pub min_size: u64,
    /// Largest permitted partition size, in records.
    pub max_size: u64,
    /// Size used before any partition has completed.
    pub initial_size: u64,
    /// Number of fetch-latency samples kept for visibility.
    pub latency_window: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            target: Duration::from_secs(180),
            grow_ratio: 1.2,
            shrink_ratio: 0.8,
            high_watermark: 1.25,
            low_watermark: 0.75,
            min_size: 100,
            max_size: 50_000,
            initial_size: 1_000,
            latency_window: 32,
        }
    }
}

impl PacingConfig {
    /// Sets the target partition duration.
    #[must_use]
    pub fn with_target(mut self, target: Duration) -> Self {
        self.target = target;
        self
    }

    /// Sets the size bounds.
    #[must_use]
    pub fn with_bounds(mut self, min: u64, max: u64) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    /// Sets the starting size.
    #[must_use]
    pub fn with_initial_size(mut self, size: u64) -> Self {
        self.initial_size = size;
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff base: first retry waits this long.
    pub base_delay: Duration,
    /// Ceiling on any single backoff delay (before jitter).
    pub max_delay: Duration,
    /// Exponential multiplier between attempts.
    pub multiplier: f64,
    /// Lower bound of the uniform jitter added to every wait.
    pub jitter_min: Duration,
    /// Upper bound of the uniform jitter.
    pub jitter_max: Duration,
    /// Whether jitter is applied at all. Disabled in tests.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_min: Duration::from_millis(250),
            jitter_max: Duration::from_millis(1500),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Creates a configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
            ..Self::default()
        }
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff delay ceiling.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the backoff delay before retry number `attempt` (1-based,
    /// counting failures so far), without jitter.
    ///
    /// A server-provided `hint` overrides the exponential schedule.
    pub fn delay_for_attempt(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint;
        }
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = self.base_delay.as_secs_f64() * exp;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Configuration of one sync job.
///
/// Created once per invocation and immutable for the job's lifetime.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Job name; keys the checkpoint.
    pub name: String,
    /// Logical window start, if bounded.
    pub window_start: Option<DateTime<Utc>>,
    /// Logical window end, if bounded.
    pub window_end: Option<DateTime<Utc>>,
    /// Scheduling mode.
    pub mode: SyncMode,
    /// Records requested per page (sequential mode).
    pub page_limit: u64,
    /// Safety ceiling on accumulation wall-clock time per partition.
    pub accumulation_ceiling: Duration,
    /// Tolerance for out-of-order records near the window boundary.
    pub late_buffer: Duration,
    /// Consecutive empty-in-window pages before smart exit fires.
    /// `None` disables the heuristic (non-monotonic sources).
    pub smart_exit_pages: Option<u32>,
    /// Calendar partition length (calendar mode).
    pub partition_length: PartitionLength,
    /// Worker pool width (calendar mode).
    pub workers: usize,
    /// Whole-partition retry bound (calendar mode).
    pub partition_retries: u32,
    /// Optional safety cap on fetch operations this run.
    pub max_operations: Option<u64>,
    /// Resume from an existing checkpoint (default true). When false the
    /// stored checkpoint is cleared so the fresh run starts from scratch.
    pub resume: bool,
    /// Clear any existing checkpoint before starting.
    pub force_restart: bool,
    /// Idempotent load strategy.
    pub strategy: LoadStrategy,
    /// Allowed difference between expected and loaded row counts.
    pub count_tolerance: u64,
    /// Whether the loader suspends destination indexes around bulk writes.
    pub manage_indexes: bool,
    /// Pacing controller settings.
    pub pacing: PacingConfig,
    /// Retry settings for fetches.
    pub retry: RetryConfig,
}

impl JobConfig {
    /// Creates a job configuration with defaults for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window_start: None,
            window_end: None,
            mode: SyncMode::Sequential,
            page_limit: 1_000,
            accumulation_ceiling: Duration::from_secs(600),
            late_buffer: Duration::from_secs(3_600),
            smart_exit_pages: Some(3),
            partition_length: PartitionLength::Monthly,
            workers: 4,
            partition_retries: 3,
            max_operations: None,
            resume: true,
            force_restart: false,
            strategy: LoadStrategy::UpsertByKey,
            count_tolerance: 0,
            manage_indexes: false,
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the sync window.
    #[must_use]
    pub fn with_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.window_start = Some(start);
        self.window_end = Some(end);
        self
    }

    /// Sets the scheduling mode.
    #[must_use]
    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the load strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: LoadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the page limit.
    #[must_use]
    pub fn with_page_limit(mut self, limit: u64) -> Self {
        self.page_limit = limit;
        self
    }

    /// Sets the worker pool width.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the fetch-operation safety cap.
    #[must_use]
    pub fn with_max_operations(mut self, cap: u64) -> Self {
        self.max_operations = Some(cap);
        self
    }

    /// Sets the pacing configuration.
    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the calendar partition length.
    #[must_use]
    pub fn with_partition_length(mut self, length: PartitionLength) -> Self {
        self.partition_length = length;
        self
    }
}
