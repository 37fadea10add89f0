use serde::{Deserialize, Serialize};

use super::{HolderIdentity, Participant};

/// One row of the editing queue, keyed by `(resource_id, user_id)`.
///
/// Position 1 is the front of the queue. The front entry is the holder only
/// once the lease has been granted to it (`granted_at` is set); a front entry
/// without a grant is a waiter that has not claimed yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub resource_id: String,
    pub user_id: String,
    /// 1-based, contiguous within a resource
    pub position: u32,
    /// Unix millis at which the entry was created
    pub joined_at: u64,
    /// Unix millis of the last heartbeat, if any
    pub last_heartbeat_at: Option<u64>,
    /// Unix millis at which the lease was granted to this entry
    pub granted_at: Option<u64>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}

impl QueueEntry {
    pub fn new(resource_id: &str, participant: &Participant, position: u32, now: u64) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            user_id: participant.user_id.clone(),
            position,
            joined_at: now,
            last_heartbeat_at: None,
            granted_at: None,
            user_email: participant.user_email.clone(),
            user_name: participant.user_name.clone(),
        }
    }

    /// Timestamp the lease timeout is measured from.
    pub fn liveness_reference(&self) -> u64 {
        self.last_heartbeat_at.unwrap_or(self.joined_at)
    }

    pub fn is_stale(&self, now: u64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.liveness_reference()) > timeout_ms
    }

    pub fn is_holder(&self) -> bool {
        self.position == 1 && self.granted_at.is_some()
    }

    pub fn holder_identity(&self) -> HolderIdentity {
        HolderIdentity {
            user_id: self.user_id.clone(),
            user_email: self.user_email.clone(),
            user_name: self.user_name.clone(),
        }
    }

    pub fn to_member(&self) -> QueueMember {
        QueueMember {
            user_id: self.user_id.clone(),
            position: self.position,
            is_holder: self.is_holder(),
            last_heartbeat_at: self.last_heartbeat_at,
            user_email: self.user_email.clone(),
            user_name: self.user_name.clone(),
        }
    }
}

/// Public view of a queue row, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMember {
    pub user_id: String,
    pub position: u32,
    pub is_holder: bool,
    pub last_heartbeat_at: Option<u64>,
    pub user_email: Option<String>,
    pub user_name: Option<String>,
}
