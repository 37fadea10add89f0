//! The coordination core. Stateless between calls: every operation loads the
//! resource's queue inside one store transaction, normalizes it, applies lazy
//! expiry, runs its own logic and writes back the difference.

use std::sync::Arc;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::infrastructure::{OpenCatalog, QueueStore, QueueTx, ResourceCatalog};
use crate::queue::QueueState;
use crate::retry::RetryPolicy;
use crate::types::{
    ClaimOutcome, HeartbeatOutcome, LeaveOutcome, Participant, QueueEntry, QueueSnapshot,
    ReleaseOutcome, SweepOutcome,
};

pub struct Coordinator {
    store: Arc<dyn QueueStore>,
    catalog: Arc<dyn ResourceCatalog>,
    config: QueueConfig,
    retry: RetryPolicy,
}

impl Coordinator {
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> Self {
        let retry = RetryPolicy::from(&config);
        Self {
            store,
            catalog: Arc::new(OpenCatalog),
            config,
            retry,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ResourceCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Enter the queue. Idempotent: an existing entry is returned untouched.
    pub fn join(&self, resource_id: &str, participant: &Participant, now: u64) -> QueueResult<QueueSnapshot> {
        validate_ids(resource_id, &participant.user_id)?;
        self.ensure_exists(resource_id)?;

        let (snapshot, joined) = self.run("join", resource_id, now, |state| {
            let joined = state.index_of(&participant.user_id).is_none();
            if joined {
                state.push_back(participant, now);
            }
            Ok((state.snapshot_for(&participant.user_id), joined))
        })?;

        if joined {
            tracing::info!(
                resource_id,
                user_id = %participant.user_id,
                position = ?snapshot.position,
                "Joined editing queue"
            );
        }
        Ok(snapshot)
    }

    /// Become the holder, or renew the lease when already holding it.
    ///
    /// Fails with `QueueError::Conflict` while another user holds a live
    /// lease; in that case nothing is written.
    pub fn claim(&self, resource_id: &str, participant: &Participant, now: u64) -> QueueResult<ClaimOutcome> {
        validate_ids(resource_id, &participant.user_id)?;
        self.ensure_exists(resource_id)?;
        let user_id = participant.user_id.as_str();

        let result = self.run("claim", resource_id, now, |state| {
            if let Some(holder) = state.holder() {
                if holder.user_id != user_id {
                    return Err(QueueError::Conflict {
                        resource_id: resource_id.to_string(),
                        holder: holder.user_id.clone(),
                        holder_email: holder.user_email.clone(),
                    });
                }
                state.touch(user_id, now);
                return Ok(ClaimOutcome {
                    granted: true,
                    already_owned: true,
                    is_editor: true,
                    position: 1,
                });
            }

            if !state.promote(user_id, now) {
                state.insert_as_holder(participant, now);
            }
            Ok(ClaimOutcome {
                granted: true,
                already_owned: false,
                is_editor: true,
                position: 1,
            })
        });

        match &result {
            Ok(outcome) if !outcome.already_owned => {
                tracing::info!(resource_id, user_id, "Editing lease granted");
            }
            Err(QueueError::Conflict { holder, .. }) => {
                tracing::debug!(resource_id, user_id, holder = %holder, "Claim refused, resource held");
            }
            _ => {}
        }
        result
    }

    /// Refresh the caller's liveness. If nobody holds the lease and the caller
    /// is at the front of the queue, the caller is granted the lease.
    ///
    /// A caller without an entry gets `success: false`; no entry is created.
    pub fn heartbeat(&self, resource_id: &str, user_id: &str, now: u64) -> QueueResult<HeartbeatOutcome> {
        validate_ids(resource_id, user_id)?;
        self.ensure_exists(resource_id)?;

        let outcome = self.run("heartbeat", resource_id, now, |state| {
            if !state.touch(user_id, now) {
                return Ok(HeartbeatOutcome {
                    success: false,
                    promoted: false,
                    is_editor: false,
                    position: None,
                    holder: state.holder_identity(),
                });
            }

            let at_front = state.front().is_some_and(|e| e.user_id == user_id);
            let promoted = state.holder().is_none() && at_front && state.promote(user_id, now);

            let snapshot = state.snapshot_for(user_id);
            Ok(HeartbeatOutcome {
                success: true,
                promoted,
                is_editor: snapshot.is_editor,
                position: snapshot.position,
                holder: snapshot.holder,
            })
        })?;

        if outcome.promoted {
            tracing::info!(resource_id, user_id, "Front waiter promoted to editor");
        }
        Ok(outcome)
    }

    /// Leave the queue. Idempotent, and never promotes the next waiter: the
    /// new front entry has to `claim` (or heartbeat) to get the lease.
    pub fn leave(&self, resource_id: &str, user_id: &str, now: u64) -> QueueResult<LeaveOutcome> {
        validate_ids(resource_id, user_id)?;

        let removed = self.run("leave", resource_id, now, |state| Ok(state.remove(user_id).is_some()))?;
        if removed {
            tracing::info!(resource_id, user_id, "Left editing queue");
        }
        Ok(LeaveOutcome {
            success: true,
            removed,
        })
    }

    /// Drop the lease, but only if the caller currently holds it.
    pub fn release(&self, resource_id: &str, user_id: &str, now: u64) -> QueueResult<ReleaseOutcome> {
        validate_ids(resource_id, user_id)?;
        self.ensure_exists(resource_id)?;

        let released = self.run("release", resource_id, now, |state| {
            let holds = state.holder().is_some_and(|h| h.user_id == user_id);
            if holds {
                state.remove(user_id);
            }
            Ok(holds)
        })?;
        if released {
            tracing::info!(resource_id, user_id, "Editing lease released");
        }
        Ok(ReleaseOutcome {
            success: true,
            released,
        })
    }

    /// Current queue as seen by `user_id`. Never inserts an entry, but does
    /// persist normalization and lazy expiry.
    pub fn status(&self, resource_id: &str, user_id: &str, now: u64) -> QueueResult<QueueSnapshot> {
        validate_ids(resource_id, user_id)?;
        self.ensure_exists(resource_id)?;
        self.run("status", resource_id, now, |state| Ok(state.snapshot_for(user_id)))
    }

    /// Apply normalization and lazy expiry to one resource without any
    /// caller-specific logic.
    pub fn sweep(&self, resource_id: &str, now: u64) -> QueueResult<SweepOutcome> {
        if resource_id.is_empty() {
            return Err(QueueError::InvalidRequest("resource_id is required".to_string()));
        }
        let mut evicted = 0;
        let remaining = self.run_with_expired(
            "sweep",
            resource_id,
            now,
            |state| Ok(state.len()),
            |expired| evicted = expired.len(),
        )?;
        Ok(SweepOutcome {
            resource_id: resource_id.to_string(),
            evicted,
            remaining,
        })
    }

    /// Sweep every resource the store knows about. A failing resource is
    /// logged and skipped.
    pub fn sweep_all(&self, now: u64) -> QueueResult<Vec<SweepOutcome>> {
        let mut outcomes = Vec::new();
        for resource_id in self.store.resource_ids()? {
            match self.sweep(&resource_id, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => tracing::warn!(resource_id = %resource_id, error = %e, "Sweep failed"),
            }
        }
        Ok(outcomes)
    }

    fn ensure_exists(&self, resource_id: &str) -> QueueResult<()> {
        if self.catalog.contains(resource_id)? {
            Ok(())
        } else {
            Err(QueueError::NotFound {
                resource_id: resource_id.to_string(),
            })
        }
    }

    fn run<T>(
        &self,
        operation: &'static str,
        resource_id: &str,
        now: u64,
        body: impl FnMut(&mut QueueState) -> QueueResult<T>,
    ) -> QueueResult<T> {
        self.run_with_expired(operation, resource_id, now, body, |_| {})
    }

    /// One transaction per attempt: load and normalize, expire a stale front
    /// entry, run `body`, write the diff. Transient failures retry the whole
    /// thing from the load.
    fn run_with_expired<T>(
        &self,
        operation: &'static str,
        resource_id: &str,
        now: u64,
        mut body: impl FnMut(&mut QueueState) -> QueueResult<T>,
        on_expired: impl FnOnce(&[QueueEntry]),
    ) -> QueueResult<T> {
        let timeout_ms = self.config.lease_timeout_ms;

        let (value, expired) = self.retry.run(operation, resource_id, || {
            let mut output = None;
            self.store.transact(resource_id, &mut |tx: &mut dyn QueueTx| {
                let mut state = QueueState::load(tx)?;
                state.expire_stale_front(now, timeout_ms);
                let value = body(&mut state)?;
                state.commit(tx)?;
                output = Some((value, state.take_expired()));
                Ok(())
            })?;
            output.ok_or_else(|| {
                QueueError::Storage(format!("{operation} transaction committed without a result"))
            })
        })?;

        for entry in &expired {
            tracing::info!(
                resource_id,
                user_id = %entry.user_id,
                last_heartbeat_at = ?entry.last_heartbeat_at,
                "Evicted stale front entry"
            );
        }
        on_expired(&expired);
        Ok(value)
    }
}

fn validate_ids(resource_id: &str, user_id: &str) -> QueueResult<()> {
    if resource_id.is_empty() {
        return Err(QueueError::InvalidRequest("resource_id is required".to_string()));
    }
    if user_id.is_empty() {
        return Err(QueueError::InvalidRequest("user_id is required".to_string()));
    }
    Ok(())
}
