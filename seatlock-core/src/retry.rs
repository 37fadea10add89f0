use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::config::QueueConfig;
use crate::error::QueueError;

/// Result of backoff calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStep {
    /// Sleep duration in milliseconds (includes jitter)
    pub sleep_ms: u64,
    /// Backoff to use after the next failure
    pub next_backoff_ms: u64,
}

/// Exponential backoff with additive jitter. Jitter is clamped to half the
/// current backoff; the next backoff doubles up to `max_backoff_ms`.
pub fn compute_backoff(current_backoff_ms: u64, max_backoff_ms: u64, jitter_ms: u64) -> BackoffStep {
    let jitter = jitter_ms.min(current_backoff_ms / 2);
    BackoffStep {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}

/// Retries an operation while it fails with `QueueError::Transient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff_ms: config.retry_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(
        &self,
        operation: &'static str,
        resource_id: &str,
        mut attempt: impl FnMut() -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut backoff_ms = self.base_backoff_ms;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match attempt() {
                Err(QueueError::Transient(reason)) if attempts < self.max_attempts => {
                    let step = compute_backoff(backoff_ms, self.max_backoff_ms, draw_jitter(backoff_ms));
                    tracing::debug!(
                        operation,
                        resource_id,
                        attempt = attempts,
                        sleep_ms = step.sleep_ms,
                        %reason,
                        "Transient store conflict, retrying"
                    );
                    if step.sleep_ms > 0 {
                        thread::sleep(Duration::from_millis(step.sleep_ms));
                    }
                    backoff_ms = step.next_backoff_ms;
                }
                Err(QueueError::Transient(reason)) => {
                    tracing::warn!(operation, resource_id, attempts, %reason, "Giving up after transient conflicts");
                    return Err(QueueError::RetriesExhausted {
                        operation,
                        resource_id: resource_id.to_string(),
                        attempts,
                    });
                }
                other => return other,
            }
        }
    }
}

/// Uniform jitter in `0..=backoff_ms / 2`.
pub fn draw_jitter(backoff_ms: u64) -> u64 {
    rand::rng().random_range(0..backoff_ms / 2 + 1)
}
