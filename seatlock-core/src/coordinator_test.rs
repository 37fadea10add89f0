#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::config::QueueConfig;
    use crate::coordinator::Coordinator;
    use crate::error::QueueError;
    use crate::infrastructure::{QueueStore, TxWork};
    use crate::infrastructure_in_memory::{InMemoryCatalog, InMemoryQueueStore};
    use crate::types::{AccessMode, Participant};

    const TIMEOUT: u64 = 30_000;

    fn setup() -> (Arc<InMemoryQueueStore>, Coordinator) {
        let store = Arc::new(InMemoryQueueStore::new());
        let coordinator = Coordinator::new(store.clone(), QueueConfig::default());
        (store, coordinator)
    }

    fn alice() -> Participant {
        Participant::new("alice").with_email("alice@example.com").with_name("Alice")
    }

    fn bob() -> Participant {
        Participant::new("bob").with_email("bob@example.com")
    }

    fn positions(store: &InMemoryQueueStore) -> Vec<(String, u32)> {
        store
            .entries("doc")
            .unwrap()
            .into_iter()
            .map(|e| (e.user_id, e.position))
            .collect()
    }

    /// Fails the first `failures` transactions with a serialization conflict.
    struct FlakyStore {
        inner: InMemoryQueueStore,
        failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryQueueStore::new(),
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl QueueStore for FlakyStore {
        fn transact(&self, resource_id: &str, work: &mut TxWork<'_>) -> Result<(), QueueError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(QueueError::Transient("injected".to_string()));
            }
            self.inner.transact(resource_id, work)
        }

        fn resource_ids(&self) -> Result<Vec<String>, QueueError> {
            self.inner.resource_ids()
        }
    }

    fn no_backoff() -> QueueConfig {
        QueueConfig {
            retry_backoff_ms: 0,
            max_backoff_ms: 0,
            ..QueueConfig::default()
        }
    }

    #[test]
    fn test_claim_on_empty_queue_is_granted() {
        let (store, coordinator) = setup();
        let outcome = coordinator.claim("doc", &alice(), 1_000).unwrap();

        assert!(outcome.granted);
        assert!(!outcome.already_owned);
        assert_eq!(outcome.position, 1);
        assert_eq!(positions(&store), vec![("alice".to_string(), 1)]);
    }

    #[test]
    fn test_join_is_idempotent() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();

        let first = coordinator.join("doc", &bob(), 1_000).unwrap();
        let second = coordinator.join("doc", &bob(), 2_000).unwrap();

        assert_eq!(first.position, Some(2));
        assert_eq!(second.position, Some(2));
        assert!(!second.is_editor);
        assert_eq!(second.editor_email(), Some("alice@example.com"));
        let entries = store.entries("doc").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].joined_at, 1_000);
    }

    #[test]
    fn test_claim_conflicts_with_live_holder_and_writes_nothing() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 1_000).unwrap();
        let before = store.entries("doc").unwrap();
        let version = store.version("doc").unwrap();

        let err = coordinator.claim("doc", &bob(), 5_000).unwrap_err();

        match err {
            QueueError::Conflict { holder, holder_email, .. } => {
                assert_eq!(holder, "alice");
                assert_eq!(holder_email.as_deref(), Some("alice@example.com"));
            }
            other => panic!("expected Conflict, got {other:?}"),
        }
        assert_eq!(store.entries("doc").unwrap(), before);
        assert_eq!(store.version("doc").unwrap(), version);
    }

    #[test]
    fn test_claim_by_holder_renews_lease() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        let outcome = coordinator.claim("doc", &alice(), 10_000).unwrap();

        assert!(outcome.already_owned);
        assert!(outcome.is_editor);
        assert_eq!(store.entries("doc").unwrap()[0].last_heartbeat_at, Some(10_000));
        // Renewed at 10s, so still alive at 35s
        assert!(coordinator.status("doc", "alice", 35_000).unwrap().is_editor);
    }

    #[test]
    fn test_claim_promotes_waiter_when_nobody_holds() {
        let (store, coordinator) = setup();
        coordinator.join("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 100).unwrap();
        coordinator.join("doc", &Participant::new("carol"), 200).unwrap();

        let outcome = coordinator.claim("doc", &Participant::new("carol"), 300).unwrap();

        assert!(outcome.granted);
        assert_eq!(
            positions(&store),
            vec![
                ("carol".to_string(), 1),
                ("alice".to_string(), 2),
                ("bob".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_claim_without_entry_jumps_in_front_when_nobody_holds() {
        let (store, coordinator) = setup();
        coordinator.join("doc", &alice(), 0).unwrap();
        coordinator.claim("doc", &bob(), 100).unwrap();

        assert_eq!(
            positions(&store),
            vec![("bob".to_string(), 1), ("alice".to_string(), 2)]
        );
    }

    #[test]
    fn test_expired_holder_is_replaced_by_heartbeating_waiter() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 1_000).unwrap();

        let waiting = coordinator.heartbeat("doc", "bob", 20_000).unwrap();
        assert!(waiting.success);
        assert!(!waiting.promoted);
        assert_eq!(waiting.position, Some(2));

        let promoted = coordinator.heartbeat("doc", "bob", TIMEOUT + 1).unwrap();
        assert!(promoted.success);
        assert!(promoted.promoted);
        assert!(promoted.is_editor);
        assert_eq!(promoted.position, Some(1));
        assert_eq!(promoted.holder.map(|h| h.user_id), Some("bob".to_string()));
        assert_eq!(positions(&store), vec![("bob".to_string(), 1)]);
    }

    #[test]
    fn test_leave_does_not_promote_next_waiter() {
        let (_store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 1_000).unwrap();

        let left = coordinator.leave("doc", "alice", 2_000).unwrap();
        assert!(left.success);
        assert!(left.removed);

        let status = coordinator.status("doc", "bob", 2_001).unwrap();
        assert!(!status.is_editor);
        assert_eq!(status.position, Some(1));
        assert!(status.holder.is_none());

        let claimed = coordinator.claim("doc", &bob(), 2_002).unwrap();
        assert!(claimed.granted);
        assert!(!claimed.already_owned);
        assert!(coordinator.status("doc", "bob", 2_003).unwrap().is_editor);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let (_store, coordinator) = setup();
        let outcome = coordinator.leave("doc", "nobody", 0).unwrap();
        assert!(outcome.success);
        assert!(!outcome.removed);
    }

    #[test]
    fn test_heartbeat_never_creates_an_entry() {
        let (store, coordinator) = setup();
        let outcome = coordinator.heartbeat("doc", "alice", 0).unwrap();

        assert!(!outcome.success);
        assert!(!outcome.promoted);
        assert_eq!(outcome.position, None);
        assert!(store.entries("doc").unwrap().is_empty());
    }

    #[test]
    fn test_heartbeat_does_not_promote_non_front_waiter() {
        let (store, coordinator) = setup();
        let carol = Participant::new("carol");
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 100).unwrap();
        coordinator.join("doc", &carol, 200).unwrap();
        coordinator.leave("doc", "alice", 300).unwrap();

        // bob sits at the front without the lease; carol is behind him
        let outcome = coordinator.heartbeat("doc", "carol", 400).unwrap();
        assert!(outcome.success);
        assert!(!outcome.promoted);
        assert!(!outcome.is_editor);
        assert_eq!(outcome.position, Some(2));
        assert!(outcome.holder.is_none());
        assert_eq!(
            positions(&store),
            vec![("bob".to_string(), 1), ("carol".to_string(), 2)]
        );
        assert!(store.entries("doc").unwrap().iter().all(|e| e.granted_at.is_none()));

        let outcome = coordinator.heartbeat("doc", "bob", 500).unwrap();
        assert!(outcome.promoted);
        assert_eq!(outcome.position, Some(1));
    }

    #[test]
    fn test_stale_holder_learns_it_lost_the_lease() {
        let (_store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 1_000).unwrap();

        let outcome = coordinator.heartbeat("doc", "alice", TIMEOUT + 5_000).unwrap();
        assert!(!outcome.success);
        assert!(!outcome.is_editor);
        assert_eq!(outcome.position, None);
    }

    #[test]
    fn test_status_does_not_insert_caller() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();

        let status = coordinator.status("doc", "bob", 1_000).unwrap();
        assert_eq!(status.position, None);
        assert!(!status.is_editor);
        assert_eq!(AccessMode::from(&status), AccessMode::ReadOnly {
            holder: status.holder.clone(),
            position: None,
        });
        assert_eq!(store.entries("doc").unwrap().len(), 1);
    }

    #[test]
    fn test_status_applies_lazy_expiry() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 100).unwrap();

        let status = coordinator.status("doc", "bob", TIMEOUT + 1).unwrap();
        assert_eq!(status.position, Some(1));
        assert!(!status.is_editor);
        assert_eq!(positions(&store), vec![("bob".to_string(), 1)]);
    }

    #[test]
    fn test_release_only_by_holder() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 100).unwrap();

        let refused = coordinator.release("doc", "bob", 200).unwrap();
        assert!(!refused.released);
        assert_eq!(store.entries("doc").unwrap().len(), 2);

        let released = coordinator.release("doc", "alice", 300).unwrap();
        assert!(released.released);
        assert_eq!(positions(&store), vec![("bob".to_string(), 1)]);
        assert!(!coordinator.status("doc", "bob", 400).unwrap().is_editor);
    }

    #[test]
    fn test_unknown_resource_is_not_found_and_untouched() {
        let store = Arc::new(InMemoryQueueStore::new());
        let coordinator = Coordinator::new(store.clone(), QueueConfig::default())
            .with_catalog(Arc::new(InMemoryCatalog::with_resources(["doc"])));

        let err = coordinator.join("missing", &alice(), 0).unwrap_err();
        assert_eq!(err, QueueError::NotFound { resource_id: "missing".to_string() });
        assert!(matches!(
            coordinator.claim("missing", &alice(), 0),
            Err(QueueError::NotFound { .. })
        ));
        assert!(store.resource_ids().unwrap().is_empty());

        // leave skips the catalog so unload-time calls always succeed
        assert!(coordinator.leave("missing", "alice", 0).unwrap().success);
        assert!(coordinator.join("doc", &alice(), 0).is_ok());
    }

    #[test]
    fn test_empty_ids_are_rejected() {
        let (_store, coordinator) = setup();
        assert!(matches!(
            coordinator.join("", &alice(), 0),
            Err(QueueError::InvalidRequest(_))
        ));
        assert!(matches!(
            coordinator.heartbeat("doc", "", 0),
            Err(QueueError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_transient_conflicts_are_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let coordinator = Coordinator::new(store.clone(), no_backoff());

        let snapshot = coordinator.join("doc", &alice(), 0).unwrap();
        assert_eq!(snapshot.position, Some(1));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transient_conflicts_surface_after_max_attempts() {
        let store = Arc::new(FlakyStore::new(10));
        let coordinator = Coordinator::new(store.clone(), no_backoff());

        let err = coordinator.join("doc", &alice(), 0).unwrap_err();
        assert_eq!(
            err,
            QueueError::RetriesExhausted {
                operation: "join",
                resource_id: "doc".to_string(),
                attempts: 3,
            }
        );
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_conflict_is_not_retried() {
        let store = Arc::new(FlakyStore::new(0));
        let coordinator = Coordinator::new(store.clone(), no_backoff());
        coordinator.claim("doc", &alice(), 0).unwrap();
        let before = store.calls.load(Ordering::SeqCst);

        assert!(coordinator.claim("doc", &bob(), 10).is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_sweep_evicts_dead_holder_without_traffic() {
        let (store, coordinator) = setup();
        coordinator.claim("doc", &alice(), 0).unwrap();
        coordinator.join("doc", &bob(), 100).unwrap();
        coordinator.claim("other", &bob(), 40_000).unwrap();

        let outcomes = coordinator.sweep_all(TIMEOUT + 10).unwrap();
        let doc = outcomes.iter().find(|o| o.resource_id == "doc").unwrap();
        let other = outcomes.iter().find(|o| o.resource_id == "other").unwrap();

        assert_eq!(doc.evicted, 1);
        assert_eq!(doc.remaining, 1);
        assert_eq!(other.evicted, 0);
        assert_eq!(positions(&store), vec![("bob".to_string(), 1)]);
    }

    #[test]
    fn test_join_keeps_display_payload() {
        let (_store, coordinator) = setup();
        let snapshot = coordinator.join("doc", &alice(), 0).unwrap();
        let me = &snapshot.queue[0];

        assert_eq!(me.user_email.as_deref(), Some("alice@example.com"));
        assert_eq!(me.user_name.as_deref(), Some("Alice"));
        assert!(!me.is_holder);
    }
}
