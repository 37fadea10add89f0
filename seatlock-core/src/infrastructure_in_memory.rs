use crate::error::QueueError;
use crate::infrastructure::{QueueStore, QueueTx, ResourceCatalog, TxWork};
use crate::types::QueueEntry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock};

#[derive(Debug, Default)]
struct Shard {
    // Stamp of the last committed write. A commit whose snapshot stamp is
    // stale loses and reports Transient.
    version: u64,
    rows: BTreeMap<String, QueueEntry>,
}

#[derive(Debug, Default)]
struct Shards {
    // Store-wide and monotonic, so a resource that is emptied and written
    // again never hands out a stamp an old snapshot could still hold.
    last_stamp: u64,
    by_resource: HashMap<String, Shard>,
}

/// Process-local queue store with optimistic, per-resource transactions.
///
/// A transaction works on a private copy of the resource's rows and only
/// publishes them if nobody else committed to that resource in between.
/// Transactions on different resources never contend. A resource whose last
/// row is deleted is dropped from the store.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    shards: Mutex<Shards>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed rows of a resource, ordered by position.
    pub fn entries(&self, resource_id: &str) -> Result<Vec<QueueEntry>, QueueError> {
        let shards = self.lock()?;
        Ok(shards
            .by_resource
            .get(resource_id)
            .map(|shard| sorted(shard.rows.values().cloned().collect()))
            .unwrap_or_default())
    }

    /// Stamp of the last committed write on a resource, 0 when it has no rows.
    pub fn version(&self, resource_id: &str) -> Result<u64, QueueError> {
        let shards = self.lock()?;
        Ok(shards.by_resource.get(resource_id).map(|s| s.version).unwrap_or(0))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shards>, QueueError> {
        self.shards
            .lock()
            .map_err(|_| QueueError::Storage("in-memory queue store lock poisoned".to_string()))
    }
}

struct StagedTx {
    resource_id: String,
    rows: BTreeMap<String, QueueEntry>,
    dirty: bool,
}

impl QueueTx for StagedTx {
    fn resource_id(&self) -> &str {
        &self.resource_id
    }

    fn load_queue(&mut self) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(sorted(self.rows.values().cloned().collect()))
    }

    fn upsert(&mut self, entry: &QueueEntry) -> Result<(), QueueError> {
        if entry.resource_id != self.resource_id {
            return Err(QueueError::Storage(format!(
                "entry for '{}' written inside a transaction on '{}'",
                entry.resource_id, self.resource_id
            )));
        }
        self.rows.insert(entry.user_id.clone(), entry.clone());
        self.dirty = true;
        Ok(())
    }

    fn delete(&mut self, user_id: &str) -> Result<bool, QueueError> {
        let removed = self.rows.remove(user_id).is_some();
        self.dirty |= removed;
        Ok(removed)
    }
}

impl QueueStore for InMemoryQueueStore {
    fn transact(&self, resource_id: &str, work: &mut TxWork<'_>) -> Result<(), QueueError> {
        let (base_version, rows) = {
            let shards = self.lock()?;
            shards
                .by_resource
                .get(resource_id)
                .map(|s| (s.version, s.rows.clone()))
                .unwrap_or_default()
        };

        let mut tx = StagedTx {
            resource_id: resource_id.to_string(),
            rows,
            dirty: false,
        };
        work(&mut tx)?;

        // Read-only transactions saw a consistent snapshot; nothing to publish.
        if !tx.dirty {
            return Ok(());
        }

        let mut shards = self.lock()?;
        let current = shards.by_resource.get(resource_id).map_or(0, |s| s.version);
        if current != base_version {
            return Err(QueueError::Transient(format!(
                "queue '{}' moved from version {} to {} during the transaction",
                resource_id, base_version, current
            )));
        }
        if tx.rows.is_empty() {
            shards.by_resource.remove(resource_id);
            return Ok(());
        }
        shards.last_stamp += 1;
        let version = shards.last_stamp;
        shards.by_resource.insert(
            resource_id.to_string(),
            Shard {
                version,
                rows: tx.rows,
            },
        );
        Ok(())
    }

    fn resource_ids(&self) -> Result<Vec<String>, QueueError> {
        let shards = self.lock()?;
        let mut ids: Vec<String> = shards.by_resource.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

fn sorted(mut entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    entries.sort_by(|a, b| {
        (a.position, a.joined_at, &a.user_id).cmp(&(b.position, b.joined_at, &b.user_id))
    });
    entries
}

/// A catalog backed by an explicit set of resource ids.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    ids: RwLock<HashSet<String>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn insert(&self, resource_id: impl Into<String>) -> Result<bool, QueueError> {
        let mut ids = self
            .ids
            .write()
            .map_err(|_| QueueError::Storage("catalog lock poisoned".to_string()))?;
        Ok(ids.insert(resource_id.into()))
    }

    pub fn remove(&self, resource_id: &str) -> Result<bool, QueueError> {
        let mut ids = self
            .ids
            .write()
            .map_err(|_| QueueError::Storage("catalog lock poisoned".to_string()))?;
        Ok(ids.remove(resource_id))
    }
}

impl ResourceCatalog for InMemoryCatalog {
    fn contains(&self, resource_id: &str) -> Result<bool, QueueError> {
        let ids = self
            .ids
            .read()
            .map_err(|_| QueueError::Storage("catalog lock poisoned".to_string()))?;
        Ok(ids.contains(resource_id))
    }
}
