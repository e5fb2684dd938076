//! Tests for config functionality.

use crate::config::{LeaseConfig, LockSettings, LockType};
use crate::error::LockError;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = LockSettings::default();

    assert_eq!(settings.lock_type, LockType::Advisory);
    assert_eq!(settings.timeout_interval_secs, 30);
    assert_eq!(settings.refresh_rate_secs, 20);
}

#[test]
fn test_default_lease_matches_default_settings() {
    assert_eq!(LockSettings::default().lease(), LeaseConfig::default());
    assert_eq!(LeaseConfig::default().timeout_interval, Duration::from_secs(30));
    assert_eq!(LeaseConfig::default().refresh_rate, Duration::from_secs(20));
}

#[test]
fn test_parse_empty_yaml_uses_defaults() {
    let settings = LockSettings::from_yaml("").unwrap();
    assert_eq!(settings, LockSettings::default());
}

#[test]
fn test_parse_full_yaml() {
    let yaml = r#"
lock_type: link_based
timeout_interval_secs: 90
refresh_rate_secs: 15
"#;
    let settings = LockSettings::from_yaml(yaml).unwrap();

    assert_eq!(settings.lock_type, LockType::LinkBased);
    assert_eq!(settings.timeout_interval_secs, 90);
    assert_eq!(settings.refresh_rate_secs, 15);
    assert_eq!(
        settings.lease(),
        LeaseConfig::new(Duration::from_secs(90), Duration::from_secs(15))
    );
}

#[test]
fn test_unknown_fields_are_ignored() {
    let yaml = r#"
lock_type: advisory
session_dir: /var/lib/sessions
"#;
    let settings = LockSettings::from_yaml(yaml).unwrap();
    assert_eq!(settings.lock_type, LockType::Advisory);
}

#[test]
fn test_invalid_lock_type_fails() {
    let result = LockSettings::from_yaml("lock_type: mandatory\n");
    assert!(matches!(result, Err(LockError::Config(_))));
}

#[test]
fn test_zero_timeout_fails_validation() {
    let err = LockSettings::from_yaml("timeout_interval_secs: 0\n").unwrap_err();
    assert!(err.to_string().contains("timeout_interval_secs"));
}

#[test]
fn test_zero_refresh_rate_fails_validation() {
    let err = LockSettings::from_yaml("refresh_rate_secs: 0\n").unwrap_err();
    assert!(err.to_string().contains("refresh_rate_secs"));
}

#[test]
fn test_slow_refresh_is_allowed() {
    // Only logged: the refresh/timeout ordering is a convention.
    let settings = LockSettings::from_yaml("timeout_interval_secs: 10\nrefresh_rate_secs: 10\n");
    assert!(settings.is_ok());
}

#[test]
fn test_yaml_round_trip_preserves_lock_type_spelling() {
    let settings = LockSettings {
        lock_type: LockType::LinkBased,
        ..LockSettings::default()
    };
    let yaml = settings.to_yaml().unwrap();
    assert!(yaml.contains("lock_type: link_based"));
    assert_eq!(LockSettings::from_yaml(&yaml).unwrap(), settings);
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("leaselock.yaml");
    std::fs::write(&path, "lock_type: link_based\n").unwrap();

    let settings = LockSettings::load(&path).unwrap();
    assert_eq!(settings.lock_type, LockType::LinkBased);
}

#[test]
fn test_load_missing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let err = LockSettings::load(temp_dir.path().join("missing.yaml")).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn test_lock_type_from_str() {
    assert_eq!(LockType::from_str("advisory"), Some(LockType::Advisory));
    assert_eq!(LockType::from_str("link_based"), Some(LockType::LinkBased));
    assert_eq!(LockType::from_str("link-based"), Some(LockType::LinkBased));
    assert_eq!(LockType::from_str("posix"), None);
    assert_eq!(LockType::LinkBased.to_string(), "link_based");
}
