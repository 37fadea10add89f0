use serde::{Deserialize, Serialize};

use super::{HolderIdentity, QueueMember};

/// Normalized view of one resource's queue from the perspective of a caller.
/// Returned by `join` and `get_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub resource_id: String,
    pub is_editor: bool,
    /// Caller's position, `None` when the caller has no entry
    pub position: Option<u32>,
    pub holder: Option<HolderIdentity>,
    pub queue: Vec<QueueMember>,
}

impl QueueSnapshot {
    pub fn editor_email(&self) -> Option<&str> {
        self.holder.as_ref().and_then(|h| h.user_email.as_deref())
    }
}

/// Result of a successful `claim`. A refused claim is `QueueError::Conflict`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub granted: bool,
    /// The caller already held the lease; the claim only renewed it
    pub already_owned: bool,
    pub is_editor: bool,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatOutcome {
    /// `false` when the caller had no entry; nothing was written
    pub success: bool,
    /// The caller was granted the lease by this heartbeat
    pub promoted: bool,
    pub is_editor: bool,
    pub position: Option<u32>,
    pub holder: Option<HolderIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveOutcome {
    pub success: bool,
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub success: bool,
    pub released: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub resource_id: String,
    pub evicted: usize,
    pub remaining: usize,
}

/// What the access gate should allow a caller to do with the guarded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly {
        holder: Option<HolderIdentity>,
        position: Option<u32>,
    },
}

impl AccessMode {
    pub fn can_write(&self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

impl From<&QueueSnapshot> for AccessMode {
    fn from(snapshot: &QueueSnapshot) -> Self {
        if snapshot.is_editor {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly {
                holder: snapshot.holder.clone(),
                position: snapshot.position,
            }
        }
    }
}

impl From<&HeartbeatOutcome> for AccessMode {
    fn from(outcome: &HeartbeatOutcome) -> Self {
        if outcome.is_editor {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly {
                holder: outcome.holder.clone(),
                position: outcome.position,
            }
        }
    }
}
