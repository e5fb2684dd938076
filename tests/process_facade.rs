//! Process-wide facade behavior.
//!
//! Kept in its own test binary: process settings can be installed only once,
//! and these checks need them unread at the start.

use leaselock::FileLock;
use leaselock::config::{self, LockSettings, LockType};
use leaselock::lock::AdvisoryFileLock;
use tempfile::TempDir;

#[test]
fn facade_reads_settings_only_on_create_and_releases_every_strategy() {
    // Refresh and release before install must not fix the default settings.
    assert!(FileLock::refresh_all().is_clean());
    FileLock::release_all();

    let settings = LockSettings {
        lock_type: LockType::LinkBased,
        ..LockSettings::default()
    };
    config::install(settings).unwrap();

    let lock = FileLock::create();
    assert_eq!(lock.lock_type(), LockType::LinkBased);

    let temp = TempDir::new().unwrap();
    let link_path = temp.path().join("link.lock");
    let advisory_path = temp.path().join("advisory.lock");

    let link_handle = lock.acquire(&link_path).unwrap();
    let advisory_handle = AdvisoryFileLock::new().acquire(&advisory_path).unwrap();

    let report = FileLock::refresh_all();
    assert_eq!(report.refreshed, 2);
    assert!(report.is_clean());

    FileLock::release_all();

    assert!(!link_handle.is_valid());
    assert!(!advisory_handle.is_valid());
    assert!(!link_path.exists());
    assert!(!lock.is_locked(&link_path).unwrap());
    assert!(!AdvisoryFileLock::new().is_locked(&advisory_path).unwrap());

    // Both paths are free to take again.
    assert!(lock.acquire(&link_path).is_ok());
    assert!(AdvisoryFileLock::new().acquire(&advisory_path).is_ok());
}
