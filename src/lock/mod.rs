//! Cross-process file locks with lease semantics.
//!
//! Two strategies share one contract:
//!
//! - **Advisory** takes the OS whole-file lock. The lock lives as long as the
//!   descriptor, so it cannot go stale.
//! - **Link-based** hard-links a record file into place and keeps it alive by
//!   touching its mtime. A lock left unrefreshed for `timeout_interval` is
//!   reclaimed by the next acquirer.
//!
//! # Registries
//!
//! Each strategy keeps a process-wide registry of the locks this process
//! holds. The refresh scheduler renews every registered lease; a lease found
//! stolen or deleted drops its entry, which invalidates the caller's
//! `LockHandle`.
//!
//! # Lock Records
//!
//! Each lock file contains JSON:
//! - `owner_id`: unique id of the acquisition
//! - `owner`: who holds it (e.g., `user@HOST`)
//! - `pid`: the process ID (optional)
//! - `acquired_at`: RFC3339 timestamp

mod advisory;
mod handle;
mod link_based;
mod record;
mod registry;
mod types;


// Re-export public API
pub use crate::config::{LeaseConfig, LockType};
pub use advisory::AdvisoryFileLock;
pub use handle::LockHandle;
pub use link_based::LinkBasedFileLock;
pub use record::LockRecord;
pub use types::{LockHolder, LockInfo, RefreshReport};

use crate::config::{self, LockSettings};
use crate::error::{LockError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A lock strategy chosen from the process-wide settings.
#[derive(Debug, Clone)]
pub enum FileLock {
    Advisory(AdvisoryFileLock),
    LinkBased(LinkBasedFileLock),
}

impl FileLock {
    /// Strategy named by the process-wide settings.
    pub fn create() -> Self {
        Self::with_settings(config::current())
    }

    pub fn with_settings(settings: &LockSettings) -> Self {
        match settings.lock_type {
            LockType::Advisory => FileLock::Advisory(AdvisoryFileLock::new()),
            LockType::LinkBased => FileLock::LinkBased(LinkBasedFileLock::new(settings.lease())),
        }
    }

    pub fn lock_type(&self) -> LockType {
        match self {
            FileLock::Advisory(_) => LockType::Advisory,
            FileLock::LinkBased(_) => LockType::LinkBased,
        }
    }

    /// Try to take the lock on `path` without blocking.
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<LockHandle> {
        match self {
            FileLock::Advisory(lock) => lock.acquire(path),
            FileLock::LinkBased(lock) => lock.acquire(path),
        }
    }

    pub fn is_locked(&self, path: impl AsRef<Path>) -> Result<bool> {
        match self {
            FileLock::Advisory(lock) => lock.is_locked(path),
            FileLock::LinkBased(lock) => lock.is_locked(path),
        }
    }

    pub fn inspect(&self, path: impl AsRef<Path>) -> Result<Option<LockInfo>> {
        match self {
            FileLock::Advisory(lock) => lock.inspect(path),
            FileLock::LinkBased(lock) => lock.inspect(path),
        }
    }

    /// Renew every lock this process holds, advisory first.
    ///
    /// Failures are collected in the report; none stops the pass. The
    /// process settings are not read, so this may run before
    /// `config::install`.
    pub fn refresh_all() -> RefreshReport {
        let mut report = AdvisoryFileLock::new().refresh_all();
        report.merge(process_link_based().refresh_all());

        debug!(
            refreshed = report.refreshed,
            lost = report.lost.len(),
            failed = report.failed.len(),
            "refreshed held locks"
        );
        report
    }

    /// Release every lock this process holds. Failures are logged.
    ///
    /// Like `refresh_all`, this leaves the process settings unread.
    pub fn release_all() {
        AdvisoryFileLock::new().release_all();
        process_link_based().release_all();
    }
}

/// Handle on the process link-based registry for refresh and release.
///
/// Held entries carry their own timeout, so the lease given here is unused.
fn process_link_based() -> LinkBasedFileLock {
    LinkBasedFileLock::new(LeaseConfig::default())
}

/// Registry key for `path`: absolute, but not canonicalized, so a lock file
/// that does not exist yet still has a stable key.
pub(crate) fn absolute_path(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| LockError::io(path, e))
}
