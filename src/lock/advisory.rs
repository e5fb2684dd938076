//! Advisory lock strategy.
//!
//! Takes the operating system's exclusive, non-blocking whole-file lock
//! (`flock` on Unix, `LockFileEx` on Windows) on a descriptor opened to the
//! target path. The OS holds the lock for the life of the descriptor, so
//! there is no lease to renew: refresh only checks that the locked file is
//! still the one at the path.
//!
//! # Network filesystems
//!
//! Advisory locks are unreliable or entirely unsupported on some network
//! filesystems (older NFS setups, many SMB mounts). Use the link-based
//! strategy there.

use super::handle::{Binding, LockHandle};
use super::record::LockRecord;
use super::registry::{Entry, Registry};
use super::types::{LockHolder, LockInfo, RefreshReport};
use super::absolute_path;
use crate::config::LockType;
use crate::error::{LockError, Result};
use crate::fs::{ensure_parent_dir, modified_at, system_time_to_utc};
use fs2::FileExt;
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

static PROCESS_REGISTRY: LazyLock<Arc<Registry<File>>> =
    LazyLock::new(|| Arc::new(Registry::new(LockType::Advisory)));

/// Advisory-lock strategy bound to a registry of held locks.
#[derive(Debug, Clone)]
pub struct AdvisoryFileLock {
    registry: Arc<Registry<File>>,
}

impl Default for AdvisoryFileLock {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisoryFileLock {
    /// Strategy bound to this process's advisory registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::clone(&PROCESS_REGISTRY),
        }
    }

    /// Strategy with its own registry, standing in for a separate process.
    #[cfg(test)]
    pub(crate) fn isolated() -> Self {
        Self {
            registry: Arc::new(Registry::new(LockType::Advisory)),
        }
    }

    /// Try to take the advisory lock on `path` without blocking.
    ///
    /// # Returns
    ///
    /// * `Ok(LockHandle)` - Lock acquired
    /// * `Err(LockError::Unavailable)` - Another descriptor holds the lock
    /// * `Err(LockError::Io)` - The file could not be opened or created
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<LockHandle> {
        let path = absolute_path(path.as_ref())?;

        self.registry.with(|entries| {
            if entries.contains_key(&path) {
                debug!(path = %path.display(), "advisory lock already held by this process");
                return Err(LockError::unavailable(&path, read_holder(&path)));
            }

            ensure_parent_dir(&path)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| LockError::io(&path, e))?;

            if let Err(e) = file.try_lock_exclusive() {
                if is_contended(&e) {
                    return Err(LockError::unavailable(&path, read_holder(&path)));
                }
                return Err(LockError::io(&path, e));
            }

            let record = LockRecord::new();
            // The record is for diagnostics only; the OS lock is what excludes.
            if let Err(e) = write_record(&path, &file, &record) {
                debug!(path = %path.display(), error = %e, "failed to write advisory lock record");
            }

            entries.insert(path.clone(), Entry::new(record.owner_id.clone(), file));
            info!(path = %path.display(), "acquired advisory lock");

            Ok(LockHandle::new(
                path,
                record.owner_id,
                Binding::Advisory(Arc::clone(&self.registry)),
            ))
        })
    }

    /// Whether any process holds the advisory lock on `path`.
    ///
    /// Probes with a brief shared lock on a fresh descriptor. Concurrent
    /// probes never contend with each other, but an `acquire` elsewhere that
    /// lands inside the probe's window sees the file as locked.
    pub fn is_locked(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = absolute_path(path.as_ref())?;
        if self.registry.with(|entries| entries.contains_key(&path)) {
            return Ok(true);
        }

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LockError::io(&path, e)),
        };

        match FileExt::try_lock_shared(&file) {
            Ok(()) => {
                unlock(&path, &file);
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(LockError::io(&path, e)),
        }
    }

    /// Describe the lock file at `path`, or `None` if there is none.
    pub fn inspect(&self, path: impl AsRef<Path>) -> Result<Option<LockInfo>> {
        let path = absolute_path(path.as_ref())?;
        let modified = match modified_at(&path) {
            Ok(modified) => modified,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LockError::io(&path, e)),
        };

        let held = self.is_locked(&path)?;
        let record = File::open(&path)
            .ok()
            .and_then(|file| LockRecord::read_from(file).ok().flatten());

        Ok(Some(LockInfo {
            path,
            lock_type: LockType::Advisory,
            record,
            last_refresh: system_time_to_utc(modified),
            held,
            is_stale: false,
        }))
    }

    /// Check every advisory lock this strategy's registry holds.
    pub fn refresh_all(&self) -> RefreshReport {
        self.registry.refresh_all(refresh_entry)
    }

    /// Unlock every held advisory lock. Failures are logged.
    pub fn release_all(&self) {
        for (path, entry) in self.registry.drain() {
            unlock(&path, &entry.state);
        }
    }

    #[cfg(test)]
    pub(crate) fn held_count(&self) -> usize {
        self.registry.len()
    }
}

/// Verify a held advisory lock still guards the file at its path.
pub(crate) fn refresh_entry(path: &Path, entry: &Entry<File>) -> Result<()> {
    let on_disk = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(LockError::OwnershipLost(path.to_path_buf()));
        }
        Err(e) => return Err(LockError::io(path, e)),
    };
    let held = entry.state.metadata().map_err(|e| LockError::io(path, e))?;

    if !same_file(&held, &on_disk) {
        return Err(LockError::OwnershipLost(path.to_path_buf()));
    }
    Ok(())
}

pub(crate) fn release(registry: &Registry<File>, path: &Path, owner_id: &str) -> Result<()> {
    let Some(entry) = registry.remove(path, owner_id) else {
        debug!(path = %path.display(), "advisory lock already released");
        return Ok(());
    };
    unlock(path, &entry.state);
    info!(path = %path.display(), "released advisory lock");
    Ok(())
}

/// Unlock a descriptor; closing it afterwards drops the lock regardless.
fn unlock(path: &Path, file: &File) {
    if let Err(e) = FileExt::unlock(file) {
        warn!(
            path = %path.display(),
            error = %e,
            "failed to unlock advisory lock; treating as released"
        );
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn write_record(path: &Path, mut file: &File, record: &LockRecord) -> Result<()> {
    let json = record.to_json()?;
    file.set_len(0)
        .and_then(|_| file.seek(SeekFrom::Start(0)))
        .and_then(|_| file.write_all(json.as_bytes()))
        .and_then(|_| file.sync_data())
        .map_err(|e| LockError::io(path, e))
}

fn read_holder(path: &Path) -> Option<LockHolder> {
    let file = File::open(path).ok()?;
    let modified = file.metadata().ok()?.modified().ok()?;
    let record = LockRecord::read_from(&file).ok().flatten();
    Some(LockHolder::new(record.as_ref(), system_time_to_utc(modified)))
}

#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    true
}
