use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// Tunables for lease expiry, presence and the transient-retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// A holder whose last heartbeat is older than this is evicted
    pub lease_timeout_ms: u64,
    /// How often a heartbeat driver should beat
    pub heartbeat_interval_ms: u64,
    /// Viewers not seen for this long drop out of the presence registry
    pub presence_ttl_ms: u64,
    /// Attempts per operation before a transient failure surfaces
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_timeout_ms: 30_000,
            heartbeat_interval_ms: 5_000,
            presence_ttl_ms: 15_000,
            max_attempts: 3,
            retry_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.lease_timeout_ms == 0 {
            return Err(QueueError::InvalidRequest(
                "lease_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.heartbeat_interval_ms >= self.lease_timeout_ms {
            return Err(QueueError::InvalidRequest(format!(
                "heartbeat_interval_ms ({}) must be between 1 and lease_timeout_ms ({})",
                self.heartbeat_interval_ms, self.lease_timeout_ms
            )));
        }
        if self.max_attempts == 0 {
            return Err(QueueError::InvalidRequest(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_backoff_ms < self.retry_backoff_ms {
            return Err(QueueError::InvalidRequest(
                "max_backoff_ms must not be below retry_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Heartbeats a holder can miss before it is evicted.
    pub fn tolerated_missed_beats(&self) -> u64 {
        self.lease_timeout_ms / self.heartbeat_interval_ms.max(1)
    }
}
