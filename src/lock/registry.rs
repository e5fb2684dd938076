//! Process-wide registry of held locks, one instance per strategy.
//!
//! The registry owns whatever backs each held lock (an open descriptor for
//! advisory locks) so the refresh scheduler can renew every lease without the
//! caller's cooperation. Callers hold a `LockHandle` naming an entry by path
//! and owner id.

use super::types::RefreshReport;
use crate::config::LockType;
use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// A held lock.
#[derive(Debug)]
pub(crate) struct Entry<S> {
    pub owner_id: String,
    pub last_refresh: DateTime<Utc>,
    /// Strategy-private state.
    pub state: S,
}

impl<S> Entry<S> {
    pub fn new(owner_id: String, state: S) -> Self {
        Self {
            owner_id,
            last_refresh: Utc::now(),
            state,
        }
    }
}

pub(crate) type Entries<S> = HashMap<PathBuf, Entry<S>>;

#[derive(Debug)]
pub(crate) struct Registry<S> {
    lock_type: LockType,
    entries: Mutex<Entries<S>>,
}

impl<S> Registry<S> {
    pub fn new(lock_type: LockType) -> Self {
        Self {
            lock_type,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries<S>> {
        // A panic mid-refresh leaves the map itself consistent.
        self.entries
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Run `f` with exclusive access to the entries.
    ///
    /// Acquisition runs its filesystem attempt inside this, so two threads of
    /// one process can never both win the same path.
    pub fn with<R>(&self, f: impl FnOnce(&mut Entries<S>) -> R) -> R {
        f(&mut self.entries())
    }

    pub fn owns(&self, path: &Path, owner_id: &str) -> bool {
        self.entries()
            .get(path)
            .is_some_and(|entry| entry.owner_id == owner_id)
    }

    /// When the entry for `path` owned by `owner_id` was last renewed.
    pub fn last_refresh(&self, path: &Path, owner_id: &str) -> Option<DateTime<Utc>> {
        self.entries()
            .get(path)
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.last_refresh)
    }

    /// Remove the entry for `path` if it belongs to `owner_id`.
    pub fn remove(&self, path: &Path, owner_id: &str) -> Option<Entry<S>> {
        let mut entries = self.entries();
        if entries.get(path)?.owner_id != owner_id {
            return None;
        }
        entries.remove(path)
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<(PathBuf, Entry<S>)> {
        self.entries().drain().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Refresh every entry with `refresh`.
    ///
    /// A failing entry never stops the pass. `OwnershipLost` drops the entry;
    /// any other error keeps it for the next pass.
    pub fn refresh_all<F>(&self, mut refresh: F) -> RefreshReport
    where
        F: FnMut(&Path, &Entry<S>) -> Result<()>,
    {
        let mut report = RefreshReport::default();
        let lock_type = self.lock_type;

        self.entries()
            .retain(|path, entry| match refresh(path, entry) {
                Ok(()) => {
                    entry.last_refresh = Utc::now();
                    report.refreshed += 1;
                    true
                }
                Err(LockError::OwnershipLost(_)) => {
                    warn!(
                        path = %path.display(),
                        lock_type = %lock_type,
                        "lock ownership lost; dropping handle"
                    );
                    report.lost.push(path.clone());
                    false
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        lock_type = %lock_type,
                        error = %err,
                        "failed to refresh lock"
                    );
                    report.failed.push((path.clone(), err));
                    true
                }
            });

        report
    }

    /// Refresh the single entry for `path` owned by `owner_id`.
    pub fn refresh_one<F>(&self, path: &Path, owner_id: &str, refresh: F) -> Result<()>
    where
        F: FnOnce(&Path, &Entry<S>) -> Result<()>,
    {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(path).filter(|e| e.owner_id == owner_id) else {
            return Err(LockError::OwnershipLost(path.to_path_buf()));
        };

        match refresh(path, entry) {
            Ok(()) => {
                entry.last_refresh = Utc::now();
                Ok(())
            }
            Err(LockError::OwnershipLost(lost)) => {
                warn!(path = %path.display(), lock_type = %self.lock_type, "lock ownership lost; dropping handle");
                entries.remove(path);
                Err(LockError::OwnershipLost(lost))
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "failed to refresh lock");
                Err(err)
            }
        }
    }
}
