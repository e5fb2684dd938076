//! Link-based lock strategy.
//!
//! Mutual exclusion comes from `link(2)`: hard-linking a fully written record
//! file into the lock path either succeeds atomically or fails with
//! `AlreadyExists`, including on network filesystems that ignore advisory
//! locks. Filesystems without hard links report an I/O error and the lock
//! fails closed.
//!
//! # Leases
//!
//! The lock file's mtime is its last-refresh timestamp. Holders touch it every
//! refresh tick; a lock whose mtime is at least `timeout_interval` old is
//! stale and may be reclaimed. The file is never rewritten after it is
//! linked in, so the record inside names one acquisition for its whole life.
//!
//! # Removing a lock
//!
//! Whoever removes the lock file of owner X (its owner on release, or a peer
//! reclaiming it) must first create the tombstone `.{name}.{X}.reap` with
//! exclusive create. Only the tombstone holder may unlink the path, and only
//! after re-reading that the path still holds X's record. Since X's file can
//! leave the path in no other way, the check and the unlink see the same
//! file, and racing reclaimers of one stale lock have exactly one winner.
//!
//! A tombstone left behind by a crashed reclaimer blocks reclaiming that one
//! stale lock: acquisition keeps failing closed until the lock is cleared.

use super::handle::{Binding, LockHandle};
use super::record::LockRecord;
use super::registry::{Entry, Registry};
use super::types::{LockHolder, LockInfo, RefreshReport};
use super::absolute_path;
use crate::config::{LeaseConfig, LockType};
use crate::error::{LockError, Result};
use crate::fs::{
    age_since, ensure_parent_dir, keyed_sibling, modified_at, sync_parent_dir,
    system_time_to_utc, touch, unique_sibling, write_new,
};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Entries carry the timeout their lock was acquired with.
static PROCESS_REGISTRY: LazyLock<Arc<Registry<Duration>>> =
    LazyLock::new(|| Arc::new(Registry::new(LockType::LinkBased)));

/// Link attempts per acquire: the first try, plus one after a reclaim.
const MAX_LINK_ATTEMPTS: usize = 2;

/// Tombstone key for lock files without a readable record.
const UNREADABLE_OWNER: &str = "unreadable";

/// Age after which an existing tombstone is reported as left behind.
const LEFTOVER_TOMBSTONE_AGE: Duration = Duration::from_secs(60);

/// Link-based strategy bound to a registry of held locks.
#[derive(Debug, Clone)]
pub struct LinkBasedFileLock {
    lease: LeaseConfig,
    registry: Arc<Registry<Duration>>,
}

impl LinkBasedFileLock {
    /// Strategy bound to this process's link-based registry.
    pub fn new(lease: LeaseConfig) -> Self {
        Self {
            lease,
            registry: Arc::clone(&PROCESS_REGISTRY),
        }
    }

    /// Strategy with its own registry, standing in for a separate process.
    #[cfg(test)]
    pub(crate) fn isolated(lease: LeaseConfig) -> Self {
        Self {
            lease,
            registry: Arc::new(Registry::new(LockType::LinkBased)),
        }
    }

    pub fn lease(&self) -> LeaseConfig {
        self.lease
    }

    /// Try to take the lock on `path` without blocking.
    ///
    /// A stale lock (unrefreshed for `timeout_interval`) is reclaimed. The
    /// temporary record file is removed on every path out of this function.
    ///
    /// # Returns
    ///
    /// * `Ok(LockHandle)` - Lock acquired
    /// * `Err(LockError::Unavailable)` - A live holder owns the lock
    /// * `Err(LockError::Io)` - Lock state could not be read or written
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<LockHandle> {
        let path = absolute_path(path.as_ref())?;
        let timeout = self.lease.timeout_interval;

        self.registry.with(|entries| {
            if entries.contains_key(&path) {
                debug!(path = %path.display(), "link-based lock already held by this process");
                return Err(LockError::unavailable(&path, live_holder(&path, timeout)));
            }

            ensure_parent_dir(&path)?;
            let record = LockRecord::new();
            let temp = TempRecord::write(&path, &record)?;

            let mut attempts = 0;
            while !link_into_place(&temp.path, &path)? {
                attempts += 1;
                match probe(&path, timeout)? {
                    Probe::Live(holder) => {
                        return Err(LockError::unavailable(&path, Some(holder)));
                    }
                    _ if attempts >= MAX_LINK_ATTEMPTS => {
                        return Err(LockError::unavailable(&path, None));
                    }
                    Probe::Vacant => continue,
                    Probe::Stale(stale) => {
                        reclaim(&path, &stale, timeout)?;
                    }
                }
            }
            sync_parent_dir(&path);

            entries.insert(path.clone(), Entry::new(record.owner_id.clone(), timeout));
            info!(path = %path.display(), "acquired link-based lock");

            Ok(LockHandle::new(
                path,
                record.owner_id,
                Binding::LinkBased(Arc::clone(&self.registry)),
            ))
        })
    }

    /// Whether the lock file at `path` exists and is fresh.
    pub fn is_locked(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = absolute_path(path.as_ref())?;
        Ok(matches!(
            probe(&path, self.lease.timeout_interval)?,
            Probe::Live(_)
        ))
    }

    /// Describe the lock file at `path`, or `None` if there is none.
    pub fn inspect(&self, path: impl AsRef<Path>) -> Result<Option<LockInfo>> {
        let path = absolute_path(path.as_ref())?;
        let Some(snapshot) = Snapshot::read(&path)? else {
            return Ok(None);
        };
        let is_stale = snapshot.is_stale(self.lease.timeout_interval);

        Ok(Some(LockInfo {
            path,
            lock_type: LockType::LinkBased,
            last_refresh: system_time_to_utc(snapshot.modified),
            record: snapshot.record,
            held: !is_stale,
            is_stale,
        }))
    }

    /// Remove the lock file at `path` on an operator's request.
    ///
    /// A fresh lock is removed only with `force`. Leftover tombstones of the
    /// lock are removed as well.
    pub fn clear(&self, path: impl AsRef<Path>, force: bool) -> Result<LockInfo> {
        let path = absolute_path(path.as_ref())?;
        let info = self.inspect(&path)?.ok_or_else(|| {
            LockError::UserError(format!("no lock exists at '{}'", path.display()))
        })?;

        if info.held && !force {
            return Err(LockError::UserError(format!(
                "lock '{}' is live; use --force to clear it anyway",
                path.display()
            )));
        }

        remove_if_present(&path)?;
        for tombstone in leftover_tombstones(&path)? {
            remove_if_present(&tombstone)?;
        }
        sync_parent_dir(&path);
        warn!(path = %path.display(), forced = force, "cleared link-based lock");

        Ok(info)
    }

    /// Renew the lease of every lock this strategy's registry holds.
    pub fn refresh_all(&self) -> RefreshReport {
        self.registry.refresh_all(refresh_entry)
    }

    /// Release every held lock. Failures are logged.
    pub fn release_all(&self) {
        for (path, entry) in self.registry.drain() {
            if let Err(e) = remove_owned(&path, &entry.owner_id, entry.state) {
                warn!(path = %path.display(), error = %e, "failed to release lock during shutdown");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn held_count(&self) -> usize {
        self.registry.len()
    }
}

/// Renew the lease of a held lock by touching its file.
pub(crate) fn refresh_entry(path: &Path, entry: &Entry<Duration>) -> Result<()> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LockError::OwnershipLost(path.to_path_buf()));
        }
        Err(e) => return Err(LockError::io(path, e)),
    };

    let record = LockRecord::read_from(&file).map_err(|e| LockError::io(path, e))?;
    if record.is_none_or(|r| r.owner_id != entry.owner_id) {
        return Err(LockError::OwnershipLost(path.to_path_buf()));
    }

    touch(&file).map_err(|e| LockError::io(path, e))
}

pub(crate) fn release(registry: &Registry<Duration>, path: &Path, owner_id: &str) -> Result<()> {
    let Some(entry) = registry.remove(path, owner_id) else {
        debug!(path = %path.display(), "link-based lock already released");
        return Ok(());
    };
    remove_owned(path, owner_id, entry.state)?;
    info!(path = %path.display(), "released link-based lock");
    Ok(())
}

/// Unlink the lock file at `path` if it still belongs to `owner_id`.
///
/// If another process holds this generation's tombstone the file is left in
/// place; it stays locked until that process removes it or its lease expires.
fn remove_owned(path: &Path, owner_id: &str, timeout: Duration) -> Result<()> {
    let Some(_tombstone) = Tombstone::claim(path, owner_id)? else {
        let remaining = modified_at(path)
            .map(|modified| timeout.saturating_sub(age_since(modified)))
            .unwrap_or(Duration::ZERO);
        info!(
            path = %path.display(),
            remaining_lease_secs = remaining.as_secs(),
            "lock is being removed by another process; leaving it until its lease expires"
        );
        return Ok(());
    };

    match Snapshot::read(path)? {
        Some(snapshot) if snapshot.owner_id() == Some(owner_id) => {
            remove_if_present(path)?;
            sync_parent_dir(path);
        }
        _ => debug!(path = %path.display(), "lock no longer records this owner; leaving it"),
    }
    Ok(())
}

/// Remove the stale lock described by `stale`, if it is still there and still stale.
fn reclaim(path: &Path, stale: &LockHolder, timeout: Duration) -> Result<()> {
    let key = stale.owner_id.as_deref().unwrap_or(UNREADABLE_OWNER);
    let Some(_tombstone) = Tombstone::claim(path, key)? else {
        return Ok(());
    };

    let Some(current) = Snapshot::read(path)? else {
        return Ok(());
    };
    if current.owner_id() == stale.owner_id.as_deref() && current.is_stale(timeout) {
        remove_if_present(path)?;
        warn!(
            path = %path.display(),
            owner = stale.owner.as_deref().unwrap_or("unknown"),
            "reclaimed stale lock"
        );
    }
    Ok(())
}

enum Probe {
    Vacant,
    Live(LockHolder),
    /// Internal signal: an abandoned lock that may be reclaimed.
    Stale(LockHolder),
}

fn probe(path: &Path, timeout: Duration) -> Result<Probe> {
    let Some(snapshot) = Snapshot::read(path)? else {
        return Ok(Probe::Vacant);
    };
    let stale = snapshot.is_stale(timeout);
    let holder = snapshot.holder();
    Ok(if stale {
        Probe::Stale(holder)
    } else {
        Probe::Live(holder)
    })
}

fn live_holder(path: &Path, timeout: Duration) -> Option<LockHolder> {
    match probe(path, timeout) {
        Ok(Probe::Live(holder)) => Some(holder),
        _ => None,
    }
}

/// The lock file's record and mtime, read from one open descriptor.
struct Snapshot {
    record: Option<LockRecord>,
    modified: SystemTime,
}

impl Snapshot {
    fn read(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LockError::io(path, e)),
        };
        let modified = file
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| LockError::io(path, e))?;
        let record = LockRecord::read_from(&file).map_err(|e| LockError::io(path, e))?;
        Ok(Some(Self { record, modified }))
    }

    fn owner_id(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.owner_id.as_str())
    }

    fn is_stale(&self, timeout: Duration) -> bool {
        age_since(self.modified) >= timeout
    }

    fn holder(&self) -> LockHolder {
        LockHolder::new(self.record.as_ref(), system_time_to_utc(self.modified))
    }
}

/// Hard-link `temp` to `path`. `Ok(false)` means the path is taken.
fn link_into_place(temp: &Path, path: &Path) -> Result<bool> {
    let Err(e) = fs::hard_link(temp, path) else {
        return Ok(true);
    };

    // NFS may lose the reply to a link that succeeded, and the retried link
    // then reports EEXIST against our own record. The temp file's link count
    // tells.
    if link_count(temp) == Some(2) {
        debug!(path = %path.display(), error = %e, "link reported failure but succeeded");
        return Ok(true);
    }

    if e.kind() == io::ErrorKind::AlreadyExists {
        Ok(false)
    } else {
        Err(LockError::io(path, e))
    }
}

#[cfg(unix)]
fn link_count(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(path).ok().map(|m| m.nlink())
}

#[cfg(not(unix))]
fn link_count(_path: &Path) -> Option<u64> {
    None
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::io(path, e)),
    }
}

fn leftover_tombstones(path: &Path) -> Result<Vec<PathBuf>> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
    else {
        return Ok(Vec::new());
    };
    let prefix = format!(".{}.", name);

    let mut tombstones = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| LockError::io(dir, e))? {
        let entry = entry.map_err(|e| LockError::io(dir, e))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name.starts_with(&prefix) && file_name.ends_with(".reap") {
            tombstones.push(entry.path());
        }
    }
    Ok(tombstones)
}

/// Uniquely named record file, removed when dropped.
struct TempRecord {
    path: PathBuf,
}

impl TempRecord {
    fn write(target: &Path, record: &LockRecord) -> Result<Self> {
        let path = unique_sibling(target, "tmp")?;
        write_new(&path, record.to_json()?.as_bytes())?;
        Ok(Self { path })
    }
}

impl Drop for TempRecord {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove temporary lock record");
        }
    }
}

/// Exclusive right to remove one generation of a lock file. Removed on drop.
struct Tombstone {
    path: PathBuf,
}

impl Tombstone {
    /// Claim the tombstone for the lock file of `owner_id`.
    ///
    /// `Ok(None)` means another process holds it.
    fn claim(lock_path: &Path, owner_id: &str) -> Result<Option<Self>> {
        let path = keyed_sibling(lock_path, owner_id, "reap")?;
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Some(Self { path })),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let abandoned = modified_at(&path)
                    .map(age_since)
                    .is_ok_and(|age| age > LEFTOVER_TOMBSTONE_AGE);
                if abandoned {
                    warn!(
                        path = %lock_path.display(),
                        tombstone = %path.display(),
                        "lock removal blocked by a leftover tombstone; clear the lock to recover"
                    );
                } else {
                    debug!(path = %lock_path.display(), "another process is removing this lock");
                }
                Ok(None)
            }
            Err(e) => Err(LockError::io(&path, e)),
        }
    }
}

impl Drop for Tombstone {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock tombstone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[cfg(unix)]
    #[test]
    fn relink_of_own_record_counts_as_acquired() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.lock");
        let record = TempRecord::write(&path, &LockRecord::new()).unwrap();

        assert!(link_into_place(&record.path, &path).unwrap());
        assert_eq!(link_count(&record.path), Some(2));

        // A retried link after a lost reply sees its own file at the path.
        assert!(link_into_place(&record.path, &path).unwrap());
    }

    #[test]
    fn link_onto_foreign_lock_is_taken() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.lock");
        fs::write(&path, "someone else").unwrap();
        let record = TempRecord::write(&path, &LockRecord::new()).unwrap();

        assert!(!link_into_place(&record.path, &path).unwrap());
    }

    #[test]
    fn release_leaves_lock_while_tombstone_is_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.lock");
        let lock = LinkBasedFileLock::isolated(LeaseConfig::default());

        let handle = lock.acquire(&path).unwrap();
        let owner_id = handle.owner_id().to_string();
        let tombstone = Tombstone::claim(&path, &owner_id).unwrap().unwrap();

        handle.release().unwrap();
        assert!(path.exists());
        assert_eq!(lock.held_count(), 0);

        // Once the other remover is done, the path can be removed again.
        drop(tombstone);
        remove_owned(&path, &owner_id, LeaseConfig::default().timeout_interval).unwrap();
        assert!(!path.exists());
    }
}
