//! The retrying fetcher: one retry loop for every source read.
//!
//! All ad hoc per-call-site retry loops funnel through [`Retrier::run`].
//! Transient failures are absorbed here and never surface past it unless
//! the attempt budget is exhausted.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::{Duration, Instant};
use tidesync_core::{SyncError, SyncResult};
use tracing::warn;

/// The result of a successful (possibly retried) operation.
#[derive(Debug)]
pub struct FetchOutcome<T> {
    /// The operation's value.
    pub value: T,
    /// Elapsed time of the final, successful attempt.
    pub latency: Duration,
    /// Number of failed attempts before success.
    pub retries: u32,
}

/// Executes operations with exponential backoff, rate-limit hints, and
/// jitter.
#[derive(Debug, Clone)]
pub struct Retrier {
    config: RetryConfig,
}

impl Retrier {
    /// Creates a retrier.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Runs `op`, retrying on retryable failures.
    ///
    /// Non-retryable failures return immediately. Once `max_attempts` is
    /// reached the last error is wrapped in
    /// [`SyncError::RetriesExhausted`].
    pub fn run<T>(&self, mut op: impl FnMut() -> SyncResult<T>) -> SyncResult<FetchOutcome<T>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = Instant::now();
            match op() {
                Ok(value) => {
                    return Ok(FetchOutcome {
                        value,
                        latency: started.elapsed(),
                        retries: attempt - 1,
                    });
                }
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.config.max_attempts {
                        return Err(SyncError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let wait = self.wait_for(attempt, &err);
                    warn!(
                        event = "retry-attempt",
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        class = %err.class(),
                        error = %err,
                        "retrying after failure"
                    );
                    std::thread::sleep(wait);
                }
            }
        }
    }

    /// Backoff before the next attempt: server hint or exponential
    /// schedule, plus uniform jitter so parallel workers never
    /// resynchronize into a thundering herd.
    fn wait_for(&self, attempt: u32, err: &SyncError) -> Duration {
        let base = self.config.delay_for_attempt(attempt, err.retry_after());
        base + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if !self.config.jitter {
            return Duration::ZERO;
        }
        let min = self.config.jitter_min.min(self.config.jitter_max);
        let max = self.config.jitter_max.max(self.config.jitter_min);
        if min == max {
            return min;
        }
        let span = (max - min).as_secs_f64();
        let offset = rand::thread_rng().gen_range(0.0..=span);
        min + Duration::from_secs_f64(offset)
    }
}
