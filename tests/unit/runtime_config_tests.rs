//! Runtime Config Unit Tests

use mirror_operator::runtime_config::{
    validate_targets, RuntimeConfig, RuntimeConfigStore, RuntimeConfigUpdate,
};

#[test]
fn test_defaults() {
    let config = RuntimeConfig::default();
    assert!(config.discovery_enabled);
    assert_eq!(config.min_transfer, 0.5);
    assert_eq!(config.max_transfer, 10.0);
    assert_eq!(config.trade_size, 0.1);
    assert_eq!(config.tp_percent, 50.0);
    assert_eq!(config.sl_percent, 20.0);
    assert!(config.auto_copy);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_update_keeps_other_fields() {
    let store = RuntimeConfigStore::new(RuntimeConfig::default());
    let updated = store
        .update(RuntimeConfigUpdate {
            trade_size: Some(0.25),
            auto_copy: Some(false),
            ..Default::default()
        })
        .unwrap();

    assert_eq!(updated.trade_size, 0.25);
    assert!(!updated.auto_copy);
    assert_eq!(updated.tp_percent, 50.0);
    assert_eq!(store.snapshot(), updated);
}

#[test]
fn test_invalid_update_changes_nothing() {
    let store = RuntimeConfigStore::new(RuntimeConfig::default());
    let before = store.snapshot();

    let result = store.update(RuntimeConfigUpdate {
        trade_size: Some(0.5),
        min_transfer: Some(20.0),
        ..Default::default()
    });
    assert!(result.is_err(), "min above max must be rejected");
    assert_eq!(store.snapshot(), before);
}

#[test]
fn test_snapshot_is_a_copy() {
    let store = RuntimeConfigStore::new(RuntimeConfig::default());
    let mut copy = store.snapshot();
    copy.trade_size = 99.0;
    assert_eq!(store.snapshot().trade_size, 0.1);
}

#[test]
fn test_target_validation() {
    assert!(validate_targets(50.0, 20.0).is_ok());
    assert!(validate_targets(0.0, 20.0).is_err());
    assert!(validate_targets(50.0, 0.0).is_err());
    assert!(validate_targets(50.0, 100.0).is_err());
    assert!(validate_targets(f64::INFINITY, 20.0).is_err());
}

#[test]
fn test_range_inclusive() {
    let config = RuntimeConfig::default();
    assert!(config.in_transfer_range(0.5));
    assert!(config.in_transfer_range(10.0));
    assert!(!config.in_transfer_range(0.49));
    assert!(!config.in_transfer_range(10.01));
}

#[test]
fn test_deserialize_with_defaults() {
    let config: RuntimeConfig = serde_json::from_str(r#"{"trade_size": 0.3}"#).unwrap();
    assert_eq!(config.trade_size, 0.3);
    assert_eq!(config.max_transfer, 10.0);
}
