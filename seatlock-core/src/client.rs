//! High-level client that wraps the coordinator, a pluggable store and the
//! presence registry, and reads the wall clock for every call.
//! The CLI server and the session runner both delegate to this.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::QueueConfig;
use crate::coordinator::Coordinator;
use crate::error::QueueResult;
use crate::infrastructure::{QueueStore, ResourceCatalog};
use crate::infrastructure_in_memory::InMemoryQueueStore;
use crate::presence::{PresenceRegistry, Viewer};
use crate::types::*;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// The main entry point for using seatlock.
pub struct QueueClient {
    coordinator: Coordinator,
    presence: PresenceRegistry,
}

impl QueueClient {
    /// Create a new QueueClient with an empty in-memory store and default config.
    pub fn new() -> Self {
        let config = QueueConfig::default();
        Self {
            presence: PresenceRegistry::new(config.presence_ttl_ms),
            coordinator: Coordinator::new(Arc::new(InMemoryQueueStore::new()), config),
        }
    }

    pub fn with_store(store: Arc<dyn QueueStore>, config: QueueConfig) -> QueueResult<Self> {
        config.validate()?;
        Ok(Self {
            presence: PresenceRegistry::new(config.presence_ttl_ms),
            coordinator: Coordinator::new(store, config),
        })
    }

    pub fn in_memory(config: QueueConfig) -> QueueResult<Self> {
        Self::with_store(Arc::new(InMemoryQueueStore::new()), config)
    }

    /// Create a new QueueClient backed by SQLite at the given path.
    /// Every process that opens the same file shares the same queues.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(path: &str, config: QueueConfig) -> QueueResult<Self> {
        let store = crate::infrastructure_sqlite::SqliteQueueStore::open(path)?;
        Self::with_store(Arc::new(store), config)
    }

    /// Restrict the client to resources the catalog knows about.
    pub fn with_catalog(mut self, catalog: Arc<dyn ResourceCatalog>) -> Self {
        self.coordinator = self.coordinator.with_catalog(catalog);
        self
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &QueueConfig {
        self.coordinator.config()
    }

    pub fn join(&self, resource_id: &str, participant: &Participant) -> QueueResult<QueueSnapshot> {
        self.coordinator.join(resource_id, participant, now_ms())
    }

    pub fn claim(&self, resource_id: &str, participant: &Participant) -> QueueResult<ClaimOutcome> {
        self.coordinator.claim(resource_id, participant, now_ms())
    }

    pub fn heartbeat(&self, resource_id: &str, user_id: &str) -> QueueResult<HeartbeatOutcome> {
        self.coordinator.heartbeat(resource_id, user_id, now_ms())
    }

    pub fn leave(&self, resource_id: &str, user_id: &str) -> QueueResult<LeaveOutcome> {
        self.coordinator.leave(resource_id, user_id, now_ms())
    }

    pub fn release(&self, resource_id: &str, user_id: &str) -> QueueResult<ReleaseOutcome> {
        self.coordinator.release(resource_id, user_id, now_ms())
    }

    pub fn status(&self, resource_id: &str, user_id: &str) -> QueueResult<QueueSnapshot> {
        self.coordinator.status(resource_id, user_id, now_ms())
    }

    /// What the caller may do with the guarded document right now.
    pub fn access(&self, resource_id: &str, user_id: &str) -> QueueResult<AccessMode> {
        let snapshot = self.status(resource_id, user_id)?;
        Ok(AccessMode::from(&snapshot))
    }

    pub fn sweep(&self, resource_id: &str) -> QueueResult<SweepOutcome> {
        self.coordinator.sweep(resource_id, now_ms())
    }

    pub fn sweep_all(&self) -> QueueResult<Vec<SweepOutcome>> {
        self.coordinator.sweep_all(now_ms())
    }

    // ─── Presence ───────────────────────────────────────────────────────────

    pub fn enter_viewer(&self, resource_id: &str, participant: &Participant) -> String {
        self.presence.enter(resource_id, participant, now_ms())
    }

    pub fn touch_viewer(&self, resource_id: &str, session_id: &str) -> bool {
        self.presence.touch(resource_id, session_id, now_ms())
    }

    pub fn exit_viewer(&self, resource_id: &str, session_id: &str) -> bool {
        self.presence.exit(resource_id, session_id)
    }

    pub fn viewers(&self, resource_id: &str) -> Vec<Viewer> {
        self.presence.viewers(resource_id, now_ms())
    }

    /// Distinct users currently looking at a resource.
    pub fn online_users(&self, resource_id: &str) -> Vec<String> {
        self.presence.online_users(resource_id, now_ms())
    }

    pub fn watched_resources(&self) -> usize {
        self.presence.watched_resources()
    }
}

impl Default for QueueClient {
    fn default() -> Self {
        Self::new()
    }
}
