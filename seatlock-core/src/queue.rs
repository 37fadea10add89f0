//! Pure queue kernel. Works on one resource's rows as loaded inside a
//! transaction and produces the minimal set of writes to persist.

use std::collections::HashMap;

use crate::error::QueueError;
use crate::infrastructure::QueueTx;
use crate::types::{HolderIdentity, Participant, QueueEntry, QueueSnapshot};

/// Rows that must be written back to reach the in-memory state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueChanges {
    pub upserts: Vec<QueueEntry>,
    pub deletes: Vec<String>,
}

impl QueueChanges {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }
}

#[derive(Debug, Clone)]
pub struct QueueState {
    resource_id: String,
    /// Always in position order once normalized
    entries: Vec<QueueEntry>,
    loaded: HashMap<String, QueueEntry>,
    expired: Vec<QueueEntry>,
}

impl QueueState {
    pub fn new(resource_id: &str, mut entries: Vec<QueueEntry>) -> Self {
        entries.sort_by(|a, b| {
            (a.position, a.joined_at, &a.user_id).cmp(&(b.position, b.joined_at, &b.user_id))
        });
        let loaded = entries
            .iter()
            .map(|e| (e.user_id.clone(), e.clone()))
            .collect();
        Self {
            resource_id: resource_id.to_string(),
            entries,
            loaded,
            expired: Vec::new(),
        }
    }

    /// Load a resource's rows through an open transaction and normalize them.
    pub fn load(tx: &mut dyn QueueTx) -> Result<Self, QueueError> {
        let resource_id = tx.resource_id().to_string();
        let entries = tx.load_queue()?;
        let mut state = Self::new(&resource_id, entries);
        state.normalize();
        Ok(state)
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries evicted by lazy expiry since the state was loaded.
    pub fn take_expired(&mut self) -> Vec<QueueEntry> {
        std::mem::take(&mut self.expired)
    }

    pub fn front(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    /// The front entry, if it has been granted the lease.
    pub fn holder(&self) -> Option<&QueueEntry> {
        self.front().filter(|e| e.is_holder())
    }

    pub fn holder_identity(&self) -> Option<HolderIdentity> {
        self.holder().map(QueueEntry::holder_identity)
    }

    pub fn index_of(&self, user_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.user_id == user_id)
    }

    pub fn entry(&self, user_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    /// Rewrite positions to `1..=N` in the current order and drop any grant
    /// that is not on the front entry. Returns how many entries changed.
    pub fn normalize(&mut self) -> usize {
        let mut changed = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            let desired = index as u32 + 1;
            let mut touched = false;
            if entry.position != desired {
                entry.position = desired;
                touched = true;
            }
            if desired != 1 && entry.granted_at.is_some() {
                entry.granted_at = None;
                touched = true;
            }
            if touched {
                changed += 1;
            }
        }
        changed
    }

    /// Evict the front entry if its lease has lapsed. At most one entry is
    /// evicted per call.
    pub fn expire_stale_front(&mut self, now: u64, timeout_ms: u64) -> Option<&QueueEntry> {
        let stale = self.front().is_some_and(|e| e.is_stale(now, timeout_ms));
        if !stale {
            return None;
        }
        let evicted = self.entries.remove(0);
        self.normalize();
        self.expired.push(evicted);
        self.expired.last()
    }

    /// Append a new waiter at the tail. The caller must not already have an entry.
    pub fn push_back(&mut self, participant: &Participant, now: u64) -> &QueueEntry {
        let position = self.entries.len() as u32 + 1;
        self.entries
            .push(QueueEntry::new(&self.resource_id, participant, position, now));
        &self.entries[self.entries.len() - 1]
    }

    /// Insert a new entry at the front with the lease granted, shifting every
    /// other entry back by one.
    pub fn insert_as_holder(&mut self, participant: &Participant, now: u64) -> &QueueEntry {
        let mut entry = QueueEntry::new(&self.resource_id, participant, 1, now);
        entry.last_heartbeat_at = Some(now);
        entry.granted_at = Some(now);
        self.entries.insert(0, entry);
        self.normalize();
        &self.entries[0]
    }

    /// Move an existing entry to the front and grant it the lease. Entries
    /// that were ahead of it move back by one. Returns false if the user has
    /// no entry.
    pub fn promote(&mut self, user_id: &str, now: u64) -> bool {
        let Some(index) = self.index_of(user_id) else {
            return false;
        };
        let mut entry = self.entries.remove(index);
        entry.last_heartbeat_at = Some(now);
        entry.granted_at = Some(now);
        self.entries.insert(0, entry);
        self.normalize();
        true
    }

    /// Record a heartbeat. Returns false if the user has no entry.
    pub fn touch(&mut self, user_id: &str, now: u64) -> bool {
        match self.entries.iter_mut().find(|e| e.user_id == user_id) {
            Some(entry) => {
                entry.last_heartbeat_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Remove a user's entry and close the gap it leaves. Nobody is promoted.
    pub fn remove(&mut self, user_id: &str) -> Option<QueueEntry> {
        let index = self.index_of(user_id)?;
        let removed = self.entries.remove(index);
        self.normalize();
        Some(removed)
    }

    pub fn snapshot_for(&self, user_id: &str) -> QueueSnapshot {
        let mine = self.entry(user_id);
        QueueSnapshot {
            resource_id: self.resource_id.clone(),
            is_editor: mine.is_some_and(QueueEntry::is_holder),
            position: mine.map(|e| e.position),
            holder: self.holder_identity(),
            queue: self.entries.iter().map(QueueEntry::to_member).collect(),
        }
    }

    /// Diff against the rows that were loaded.
    pub fn changes(&self) -> QueueChanges {
        let mut changes = QueueChanges::default();
        for entry in &self.entries {
            if self.loaded.get(&entry.user_id) != Some(entry) {
                changes.upserts.push(entry.clone());
            }
        }
        let mut deletes: Vec<String> = self
            .loaded
            .keys()
            .filter(|user_id| self.index_of(user_id).is_none())
            .cloned()
            .collect();
        deletes.sort();
        changes.deletes = deletes;
        changes
    }

    /// Write the diff through the transaction. Returns the number of row writes.
    pub fn commit(&mut self, tx: &mut dyn QueueTx) -> Result<usize, QueueError> {
        let changes = self.changes();
        for user_id in &changes.deletes {
            tx.delete(user_id)?;
        }
        for entry in &changes.upserts {
            tx.upsert(entry)?;
        }
        let written = changes.len();
        self.loaded = self
            .entries
            .iter()
            .map(|e| (e.user_id.clone(), e.clone()))
            .collect();
        Ok(written)
    }
}
