//! Client-side lease keeper. Holds the caller's last known view of the queue
//! and, on every tick, either renews the lease or keeps its waiting entry
//! alive. Whatever the coordinator answers replaces the local view.

use serde::{Deserialize, Serialize};

use crate::coordinator::Coordinator;
use crate::error::{QueueError, QueueResult};
use crate::types::{
    AccessMode, HeartbeatOutcome, HolderIdentity, LeaveOutcome, Participant, QueueSnapshot,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub is_editor: bool,
    pub position: Option<u32>,
    pub holder: Option<HolderIdentity>,
}

impl SessionView {
    pub fn access(&self) -> AccessMode {
        if self.is_editor {
            AccessMode::ReadWrite
        } else {
            AccessMode::ReadOnly {
                holder: self.holder.clone(),
                position: self.position,
            }
        }
    }
}

impl From<&QueueSnapshot> for SessionView {
    fn from(snapshot: &QueueSnapshot) -> Self {
        Self {
            is_editor: snapshot.is_editor,
            position: snapshot.position,
            holder: snapshot.holder.clone(),
        }
    }
}

impl From<&HeartbeatOutcome> for SessionView {
    fn from(outcome: &HeartbeatOutcome) -> Self {
        Self {
            is_editor: outcome.is_editor,
            position: outcome.position,
            holder: outcome.holder.clone(),
        }
    }
}

/// What a tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickAction {
    /// Joined the queue (first tick, or the entry had disappeared)
    Joined,
    /// Got the lease by claiming from the front of the queue
    Claimed,
    /// Renewed a lease already held
    Renewed,
    /// Got the lease through a heartbeat promotion
    Promoted,
    /// Still waiting behind a live holder
    Waiting,
    /// Believed to hold the lease but someone else has it now
    LostLease,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub action: TickAction,
    pub view: SessionView,
}

pub struct HeartbeatDriver {
    resource_id: String,
    participant: Participant,
    view: Option<SessionView>,
}

impl HeartbeatDriver {
    pub fn new(resource_id: impl Into<String>, participant: Participant) -> Self {
        Self {
            resource_id: resource_id.into(),
            participant,
            view: None,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn view(&self) -> Option<&SessionView> {
        self.view.as_ref()
    }

    /// One beat. The first beat joins the queue.
    pub fn tick(&mut self, coordinator: &Coordinator, now: u64) -> QueueResult<Tick> {
        let tick = match self.view.as_ref().map(|v| v.is_editor) {
            None => self.enter(coordinator, now, TickAction::Joined)?,
            Some(true) => self.renew(coordinator, now)?,
            Some(false) => self.beat(coordinator, now)?,
        };
        self.view = Some(tick.view.clone());
        Ok(tick)
    }

    /// Leave the queue and forget the local view.
    pub fn stop(&mut self, coordinator: &Coordinator, now: u64) -> QueueResult<LeaveOutcome> {
        self.view = None;
        coordinator.leave(&self.resource_id, &self.participant.user_id, now)
    }

    /// Join, then claim straight away if the queue put us at the front.
    fn enter(&self, coordinator: &Coordinator, now: u64, action: TickAction) -> QueueResult<Tick> {
        let snapshot = coordinator.join(&self.resource_id, &self.participant, now)?;
        if snapshot.is_editor || snapshot.position != Some(1) {
            return Ok(Tick {
                action,
                view: SessionView::from(&snapshot),
            });
        }
        match coordinator.claim(&self.resource_id, &self.participant, now) {
            Ok(_) => {
                let snapshot = coordinator.status(&self.resource_id, &self.participant.user_id, now)?;
                Ok(Tick {
                    action: TickAction::Claimed,
                    view: SessionView::from(&snapshot),
                })
            }
            Err(QueueError::Conflict { .. }) => Ok(Tick {
                action,
                view: SessionView::from(&snapshot),
            }),
            Err(e) => Err(e),
        }
    }

    fn renew(&self, coordinator: &Coordinator, now: u64) -> QueueResult<Tick> {
        match coordinator.claim(&self.resource_id, &self.participant, now) {
            Ok(outcome) => {
                let snapshot = coordinator.status(&self.resource_id, &self.participant.user_id, now)?;
                let action = if outcome.already_owned {
                    TickAction::Renewed
                } else {
                    TickAction::Claimed
                };
                Ok(Tick {
                    action,
                    view: SessionView::from(&snapshot),
                })
            }
            Err(QueueError::Conflict { holder, .. }) => {
                tracing::warn!(
                    resource_id = %self.resource_id,
                    user_id = %self.participant.user_id,
                    holder = %holder,
                    "Editing lease lost, falling back to the queue"
                );
                let tick = self.enter(coordinator, now, TickAction::LostLease)?;
                Ok(Tick {
                    action: TickAction::LostLease,
                    view: tick.view,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn beat(&self, coordinator: &Coordinator, now: u64) -> QueueResult<Tick> {
        let outcome = coordinator.heartbeat(&self.resource_id, &self.participant.user_id, now)?;
        if !outcome.success {
            return self.enter(coordinator, now, TickAction::Joined);
        }
        let action = if outcome.promoted {
            TickAction::Promoted
        } else {
            TickAction::Waiting
        };
        Ok(Tick {
            action,
            view: SessionView::from(&outcome),
        })
    }
}
