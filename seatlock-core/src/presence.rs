//! Who is looking at a resource right now. Process-local and best-effort: it
//! is lost on restart and is never consulted when deciding who may edit.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::types::Participant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub session_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub first_seen: u64,
    pub last_seen: u64,
}

type Rooms = HashMap<String, HashMap<String, Viewer>>;

pub struct PresenceRegistry {
    ttl_ms: u64,
    rooms: Mutex<Rooms>,
}

impl PresenceRegistry {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Register a viewing session and return its id.
    pub fn enter(&self, resource_id: &str, participant: &Participant, now: u64) -> String {
        let session_id = nanoid::nanoid!();
        let viewer = Viewer {
            session_id: session_id.clone(),
            user_id: participant.user_id.clone(),
            user_name: participant.user_name.clone(),
            first_seen: now,
            last_seen: now,
        };
        let mut rooms = self.rooms();
        self.prune(&mut rooms, now);
        rooms
            .entry(resource_id.to_string())
            .or_default()
            .insert(session_id.clone(), viewer);
        session_id
    }

    /// Keep a session alive. Returns false if it is unknown or already pruned.
    pub fn touch(&self, resource_id: &str, session_id: &str, now: u64) -> bool {
        let mut rooms = self.rooms();
        self.prune(&mut rooms, now);
        match rooms.get_mut(resource_id).and_then(|room| room.get_mut(session_id)) {
            Some(viewer) => {
                viewer.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn exit(&self, resource_id: &str, session_id: &str) -> bool {
        let mut rooms = self.rooms();
        let Some(room) = rooms.get_mut(resource_id) else {
            return false;
        };
        let removed = room.remove(session_id).is_some();
        if room.is_empty() {
            rooms.remove(resource_id);
        }
        removed
    }

    /// Live sessions on a resource, oldest first. Expired sessions are pruned.
    pub fn viewers(&self, resource_id: &str, now: u64) -> Vec<Viewer> {
        let mut rooms = self.rooms();
        self.prune(&mut rooms, now);
        let Some(room) = rooms.get(resource_id) else {
            return Vec::new();
        };
        let mut viewers: Vec<Viewer> = room.values().cloned().collect();
        viewers.sort_by(|a, b| (a.first_seen, &a.session_id).cmp(&(b.first_seen, &b.session_id)));
        viewers
    }

    /// Distinct users with at least one live session.
    pub fn online_users(&self, resource_id: &str, now: u64) -> Vec<String> {
        let mut users: Vec<String> = self
            .viewers(resource_id, now)
            .into_iter()
            .map(|v| v.user_id)
            .collect();
        users.sort();
        users.dedup();
        users
    }

    /// Resources with at least one stored session.
    pub fn watched_resources(&self) -> usize {
        self.rooms().len()
    }

    /// Drop expired sessions everywhere, and rooms left empty.
    fn prune(&self, rooms: &mut Rooms, now: u64) {
        rooms.retain(|_, room| {
            room.retain(|_, viewer| !self.is_expired(viewer, now));
            !room.is_empty()
        });
    }

    fn is_expired(&self, viewer: &Viewer, now: u64) -> bool {
        now.saturating_sub(viewer.last_seen) > self.ttl_ms
    }

    fn rooms(&self) -> MutexGuard<'_, Rooms> {
        // Presence is advisory; a panic elsewhere must not take it down.
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
