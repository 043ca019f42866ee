//! Adaptive pacing: turn observed partition durations into partition sizes.

use crate::config::PacingConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::info;

/// A bounded FIFO of recent operation latencies.
///
/// Held purely for visibility; samples are never persisted and never feed
/// back into control decisions directly.
#[derive(Debug)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    cap: usize,
}

impl LatencyWindow {
    /// Creates a window keeping at most `cap` samples.
    pub fn new(cap: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    /// Records a sample, evicting the oldest once full.
    pub fn observe(&mut self, sample: Duration) {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples have been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the held samples.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }
}

/// Proportional control loop over partition sizes.
///
/// Compares the last partition's wall-clock time against the configured
/// target and grows or shrinks the next partition accordingly, never
/// leaving the `[min_size, max_size]` bounds. Deliberately not a PID
/// controller: stability wins over optimality.
#[derive(Debug)]
pub struct PacingController {
    config: PacingConfig,
    window: LatencyWindow,
    last_partition: Option<Duration>,
}

impl PacingController {
    /// Creates a controller.
    pub fn new(config: PacingConfig) -> Self {
        let window = LatencyWindow::new(config.latency_window);
        Self {
            config,
            window,
            last_partition: None,
        }
    }

    /// Size to use before any partition has completed.
    #[must_use]
    pub fn initial_size(&self) -> u64 {
        self.config
            .initial_size
            .clamp(self.config.min_size, self.config.max_size)
    }

    /// Records one fetch latency, for visibility.
    pub fn observe_latency(&mut self, latency: Duration) {
        self.window.observe(latency);
    }

    /// Records a completed partition's wall-clock time.
    pub fn observe_partition(&mut self, duration: Duration) {
        self.last_partition = Some(duration);
    }

    /// Mean of the recent fetch latencies, if any.
    #[must_use]
    pub fn mean_latency(&self) -> Option<Duration> {
        self.window.mean()
    }

    /// Returns the partition size to use next.
    pub fn next_size(&self, current: u64) -> u64 {
        let current = current.clamp(self.config.min_size, self.config.max_size);
        let Some(duration) = self.last_partition else {
            return current;
        };

        let target = self.config.target.as_secs_f64();
        let observed = duration.as_secs_f64();

        let proposed = if observed > target * self.config.high_watermark {
            (current as f64 * self.config.shrink_ratio).round() as u64
        } else if observed < target * self.config.low_watermark {
            let grown = (current as f64 * self.config.grow_ratio).round() as u64;
            // Integer rounding must not stall growth at small sizes.
            grown.max(current + 1)
        } else {
            current
        };

        let next = proposed.clamp(self.config.min_size, self.config.max_size);
        if next != current {
            info!(
                event = "partition-size-change",
                old = current,
                new = next,
                duration_ms = duration.as_millis() as u64,
                target_ms = self.config.target.as_millis() as u64,
                "partition size adjusted"
            );
        }
        next
    }
}
