//! Implementation of the `leaselock clear` command.

use crate::cli::ClearArgs;
use leaselock::FileLock;
use leaselock::config::LockType;
use leaselock::error::{LockError, Result};

/// Execute the `leaselock clear` command.
///
/// Only link-based locks can be cleared: an advisory lock disappears with
/// its holder's descriptor.
pub fn cmd_clear(args: ClearArgs, lock: &FileLock) -> Result<()> {
    let FileLock::LinkBased(lock) = lock else {
        return Err(LockError::UserError(format!(
            "only link-based locks can be cleared.\n\n\
             To clear a link-based lock, run:\n  leaselock --lock-type {} clear {}",
            LockType::LinkBased,
            args.path.display()
        )));
    };

    let cleared = lock.clear(&args.path, args.force)?;

    println!("Cleared lock: {}", cleared.path.display());
    if let Some(record) = &cleared.record {
        println!("  Owner: {}", record.owner);
    }
    if !cleared.is_stale {
        println!("  Warning: the lock was still live; its holder will lose it on its next refresh.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaselock::config::LockSettings;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn link_based() -> FileLock {
        FileLock::with_settings(&LockSettings {
            lock_type: LockType::LinkBased,
            ..LockSettings::default()
        })
    }

    fn args(path: PathBuf, force: bool) -> ClearArgs {
        ClearArgs { path, force }
    }

    #[test]
    fn advisory_locks_cannot_be_cleared() {
        let temp = TempDir::new().unwrap();
        let err = cmd_clear(
            args(temp.path().join("job.lock"), true),
            &FileLock::with_settings(&LockSettings::default()),
        )
        .unwrap_err();
        assert!(matches!(err, LockError::UserError(_)));
    }

    #[test]
    fn clears_stale_lock_without_force() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.lock");
        std::fs::write(&path, "left behind").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        cmd_clear(args(path.clone(), false), &link_based()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn live_lock_requires_force() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("job.lock");
        std::fs::write(&path, "fresh").unwrap();

        let err = cmd_clear(args(path.clone(), false), &link_based()).unwrap_err();
        assert!(matches!(err, LockError::UserError(_)));
        assert!(path.exists());

        cmd_clear(args(path.clone(), true), &link_based()).unwrap();
        assert!(!path.exists());
    }
}
