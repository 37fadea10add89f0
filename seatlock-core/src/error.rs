//! Error taxonomy shared by the stores and the coordinator.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The guarded resource does not exist. Nothing was written.
    #[error("resource '{resource_id}' not found")]
    NotFound { resource_id: String },

    /// Another live holder owns the lease. The caller should `join` and wait.
    #[error("resource '{resource_id}' is being edited by '{holder}'")]
    Conflict {
        resource_id: String,
        holder: String,
        holder_email: Option<String>,
    },

    /// The store refused the commit because a concurrent transaction on the
    /// same resource won. Retrying the whole operation is safe.
    #[error("transaction conflict: {0}")]
    Transient(String),

    #[error("{operation} on '{resource_id}' failed after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        resource_id: String,
        attempts: u32,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Transient(_))
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
