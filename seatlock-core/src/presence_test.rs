#[cfg(test)]
mod tests {
    use crate::presence::PresenceRegistry;
    use crate::types::Participant;

    const TTL: u64 = 15_000;

    #[test]
    fn test_enter_lists_viewers_oldest_first() {
        let registry = PresenceRegistry::new(TTL);
        let first = registry.enter("doc", &Participant::new("alice").with_name("Alice"), 100);
        let second = registry.enter("doc", &Participant::new("bob"), 200);

        assert_ne!(first, second);
        let viewers = registry.viewers("doc", 300);
        let sessions: Vec<&str> = viewers.iter().map(|v| v.session_id.as_str()).collect();
        assert_eq!(sessions, vec![first.as_str(), second.as_str()]);
        assert_eq!(viewers[0].user_name.as_deref(), Some("Alice"));
        assert!(registry.viewers("other", 300).is_empty());
    }

    #[test]
    fn test_sessions_expire_after_ttl() {
        let registry = PresenceRegistry::new(TTL);
        let session = registry.enter("doc", &Participant::new("alice"), 0);

        assert_eq!(registry.viewers("doc", TTL).len(), 1);
        assert!(registry.viewers("doc", TTL + 1).is_empty());
        assert!(!registry.touch("doc", &session, TTL + 2));
    }

    #[test]
    fn test_touch_extends_session() {
        let registry = PresenceRegistry::new(TTL);
        let session = registry.enter("doc", &Participant::new("alice"), 0);

        assert!(registry.touch("doc", &session, 10_000));
        let viewers = registry.viewers("doc", 20_000);
        assert_eq!(viewers.len(), 1);
        assert_eq!(viewers[0].first_seen, 0);
        assert_eq!(viewers[0].last_seen, 10_000);
        assert!(!registry.touch("doc", "unknown", 20_000));
    }

    #[test]
    fn test_exit_removes_session_once() {
        let registry = PresenceRegistry::new(TTL);
        let session = registry.enter("doc", &Participant::new("alice"), 0);

        assert!(registry.exit("doc", &session));
        assert!(!registry.exit("doc", &session));
        assert!(registry.viewers("doc", 1).is_empty());
    }

    #[test]
    fn test_online_users_dedups_tabs() {
        let registry = PresenceRegistry::new(TTL);
        registry.enter("doc", &Participant::new("bob"), 0);
        registry.enter("doc", &Participant::new("alice"), 10);
        registry.enter("doc", &Participant::new("alice"), 20);

        assert_eq!(registry.online_users("doc", 30), vec!["alice", "bob"]);
    }

    #[test]
    fn test_enter_prunes_expired_sessions_on_unlisted_resources() {
        let registry = PresenceRegistry::new(TTL);
        for i in 0..50 {
            registry.enter(&format!("doc-{i}"), &Participant::new("alice"), 0);
        }
        assert_eq!(registry.watched_resources(), 50);

        registry.enter("doc-new", &Participant::new("bob"), TTL + 1);
        assert_eq!(registry.watched_resources(), 1);
    }

    #[test]
    fn test_touch_prunes_expired_sessions() {
        let registry = PresenceRegistry::new(TTL);
        registry.enter("stale", &Participant::new("alice"), 0);
        let live = registry.enter("doc", &Participant::new("bob"), 10_000);

        assert!(registry.touch("doc", &live, TTL + 1));
        assert_eq!(registry.watched_resources(), 1);
    }
}
