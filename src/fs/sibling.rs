//! Sibling files used by the link-based lock.
//!
//! Lock records are written to a uniquely named file in the lock's own
//! directory and then hard-linked into place. The sibling must live on the
//! same filesystem as the target: links never cross filesystems.
//!
//! Names are unique per (host, process, thread, attempt) so concurrent
//! acquirers on one host, or on many hosts sharing the directory, never
//! collide:
//!
//! `.{filename}.{host}.{pid}.{thread}.{attempt}.{suffix}`

use crate::error::{LockError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static ATTEMPT: AtomicU64 = AtomicU64::new(0);

/// Generate a sibling path of `target` unique to this host, process, thread, and call.
pub fn unique_sibling(target: &Path, suffix: &str) -> Result<PathBuf> {
    let filename = file_name(target)?;
    let attempt = ATTEMPT.fetch_add(1, Ordering::Relaxed);
    let name = format!(
        ".{}.{}.{}.{}.{}.{}",
        filename,
        host_component(),
        std::process::id(),
        thread_component(),
        attempt,
        suffix
    );
    Ok(parent_dir(target).join(name))
}

/// Sibling path of `target` named by `key` rather than by the caller's identity.
///
/// Every process computes the same path for the same key, which is what makes
/// exclusive creation of it a cross-host claim.
pub fn keyed_sibling(target: &Path, key: &str, suffix: &str) -> Result<PathBuf> {
    let filename = file_name(target)?;
    Ok(parent_dir(target).join(format!(".{}.{}.{}", filename, sanitize(key), suffix)))
}

/// Create `path` exclusively, write `content`, and sync it to disk.
///
/// The file is removed again if writing or syncing fails.
pub fn write_new(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| LockError::io(path, e))?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        LockError::io(path, e)
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        LockError::io(path, e)
    })?;

    Ok(())
}

/// Create the parent directory of `path` if it does not exist.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| LockError::io(parent, e))?;
    }
    Ok(())
}

/// Best-effort sync of the directory containing `path`, so a new or removed
/// directory entry survives a crash.
#[cfg(unix)]
pub fn sync_parent_dir(path: &Path) {
    if let Ok(dir) = File::open(parent_dir(path)) {
        let _ = dir.sync_all();
    }
}

/// Directory entries cannot be synced through a handle on Windows.
#[cfg(not(unix))]
pub fn sync_parent_dir(_path: &Path) {}

fn parent_dir(target: &Path) -> &Path {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn file_name(target: &Path) -> Result<&str> {
    target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LockError::UserError(format!("invalid lock path '{}'", target.display())))
}

fn host_component() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    sanitize(&host)
}

fn thread_component() -> String {
    // ThreadId has no stable integer accessor; its Debug form is `ThreadId(N)`.
    let id = format!("{:?}", std::thread::current().id());
    id.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Keep only characters that are safe in a file name on every platform.
fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn unique_sibling_stays_in_target_directory() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("session.lock");

        let sibling = unique_sibling(&target, "tmp").unwrap();
        assert_eq!(sibling.parent(), Some(temp_dir.path()));

        let name = sibling.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".session.lock."));
        assert!(name.ends_with(".tmp"));
        assert!(name.contains(&std::process::id().to_string()));
    }

    #[test]
    fn unique_sibling_differs_per_call_and_thread() {
        let target = Path::new("/x/session.lock");
        let mut names = HashSet::new();
        for _ in 0..16 {
            assert!(names.insert(unique_sibling(target, "tmp").unwrap()));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(move || unique_sibling(target, "tmp").unwrap()))
            .collect();
        for handle in handles {
            assert!(names.insert(handle.join().unwrap()));
        }
    }

    #[test]
    fn keyed_sibling_is_deterministic_and_sanitized() {
        let target = Path::new("/x/session.lock");
        let a = keyed_sibling(target, "owner/../1", "reap").unwrap();
        let b = keyed_sibling(target, "owner/../1", "reap").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Path::new("/x/.session.lock.owner____1.reap"));
    }

    #[test]
    fn relative_target_uses_current_directory() {
        let sibling = keyed_sibling(Path::new("session.lock"), "k", "reap").unwrap();
        assert_eq!(sibling, Path::new("./.session.lock.k.reap"));
    }

    #[test]
    fn write_new_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("record");

        write_new(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        let err = write_new(&path, b"second").unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
        assert_eq!(fs::read(&path).unwrap(), b"first");
    }

    #[test]
    fn ensure_parent_dir_creates_missing_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("session.lock");

        ensure_parent_dir(&path).unwrap();
        assert!(temp_dir.path().join("a").join("b").is_dir());
        assert!(!path.exists());
    }
}
