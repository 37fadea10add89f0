#[cfg(test)]
mod tests {
    use crate::config::QueueConfig;
    use crate::error::QueueError;

    #[test]
    fn test_defaults_are_valid() {
        let config = QueueConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lease_timeout_ms, 30_000);
        assert_eq!(config.heartbeat_interval_ms, 5_000);
        assert_eq!(config.tolerated_missed_beats(), 6);
    }

    #[test]
    fn test_rejects_inconsistent_values() {
        let invalid = [
            QueueConfig {
                lease_timeout_ms: 0,
                ..QueueConfig::default()
            },
            QueueConfig {
                heartbeat_interval_ms: 0,
                ..QueueConfig::default()
            },
            QueueConfig {
                heartbeat_interval_ms: 30_000,
                ..QueueConfig::default()
            },
            QueueConfig {
                max_attempts: 0,
                ..QueueConfig::default()
            },
            QueueConfig {
                retry_backoff_ms: 500,
                max_backoff_ms: 100,
                ..QueueConfig::default()
            },
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(), Err(QueueError::InvalidRequest(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: QueueConfig = serde_json::from_str(r#"{"lease_timeout_ms": 60000}"#).unwrap();
        assert_eq!(config.lease_timeout_ms, 60_000);
        assert_eq!(config.max_attempts, 3);
        assert!(config.validate().is_ok());
    }
}
