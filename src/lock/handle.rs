//! RAII lock handle implementation.

use super::registry::Registry;
use super::{advisory, link_based};
use crate::config::LockType;
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The registry a handle's lock lives in.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Advisory(Arc<Registry<File>>),
    LinkBased(Arc<Registry<Duration>>),
}

impl Binding {
    fn lock_type(&self) -> LockType {
        match self {
            Binding::Advisory(_) => LockType::Advisory,
            Binding::LinkBased(_) => LockType::LinkBased,
        }
    }
}

/// An acquired lock.
///
/// When dropped, the lock is released. If release fails, a warning is logged
/// but no panic occurs. Releasing an already-released or lost lock is a no-op.
#[derive(Debug)]
pub struct LockHandle {
    path: PathBuf,
    owner_id: String,
    acquired_at: DateTime<Utc>,
    binding: Binding,
    released: bool,
}

impl LockHandle {
    pub(crate) fn new(path: PathBuf, owner_id: String, binding: Binding) -> Self {
        Self {
            path,
            owner_id,
            acquired_at: Utc::now(),
            binding,
            released: false,
        }
    }

    /// Get the path of the locked file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_type(&self) -> LockType {
        self.binding.lock_type()
    }

    /// Unique id of this acquisition, as recorded in the lock file.
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// When this process last renewed the lease, or `None` once the lock is lost.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        if self.released {
            return None;
        }
        match &self.binding {
            Binding::Advisory(registry) => registry.last_refresh(&self.path, &self.owner_id),
            Binding::LinkBased(registry) => registry.last_refresh(&self.path, &self.owner_id),
        }
    }

    /// Whether this process still holds the lock.
    ///
    /// Turns false once a refresh detects that the lease was stolen or the
    /// lock file vanished.
    pub fn is_valid(&self) -> bool {
        !self.released
            && match &self.binding {
                Binding::Advisory(registry) => registry.owns(&self.path, &self.owner_id),
                Binding::LinkBased(registry) => registry.owns(&self.path, &self.owner_id),
            }
    }

    /// Renew the lease now instead of waiting for the scheduler.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The lease was renewed
    /// * `Err(LockError::OwnershipLost)` - The lock is no longer held; the handle is invalid
    /// * `Err(LockError::Io)` - Transient failure; the lock is still registered
    pub fn refresh(&self) -> Result<()> {
        match &self.binding {
            Binding::Advisory(registry) => {
                registry.refresh_one(&self.path, &self.owner_id, advisory::refresh_entry)
            }
            Binding::LinkBased(registry) => {
                registry.refresh_one(&self.path, &self.owner_id, link_based::refresh_entry)
            }
        }
    }

    /// Manually release the lock.
    ///
    /// This is useful when you want to release the lock before the handle
    /// goes out of scope, and want to handle errors explicitly.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.release_inner()
    }

    fn release_inner(&self) -> Result<()> {
        match &self.binding {
            Binding::Advisory(registry) => advisory::release(registry, &self.path, &self.owner_id),
            Binding::LinkBased(registry) => {
                link_based::release(registry, &self.path, &self.owner_id)
            }
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.release_inner()
        {
            warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release lock"
            );
        }
    }
}
