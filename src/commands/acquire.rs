//! Implementation of the `leaselock acquire` command.
//!
//! Acquires the lock, keeps its lease fresh with the scheduler, and holds it
//! until Ctrl-C, the hold time, or the loss of the lock, whichever comes
//! first.

use crate::cli::AcquireArgs;
use leaselock::config::LockSettings;
use leaselock::error::{LockError, Result};
use leaselock::{FileLock, LeaseScheduler, LockHandle};
use std::future;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};

/// How often the holder checks that it still owns the lock.
const VALIDITY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Execute the `leaselock acquire` command.
///
/// # Returns
///
/// * `Ok(())` - The lock was held and released
/// * `Err(LockError::Unavailable)` - Another process holds the lock
/// * `Err(LockError::OwnershipLost)` - The lock was taken away while held
pub fn cmd_acquire(args: AcquireArgs, lock: &FileLock, settings: &LockSettings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| LockError::io(&args.path, e))?;

    let handle = lock.acquire(&args.path)?;
    println!(
        "Acquired {} lock: {}",
        handle.lock_type(),
        handle.path().display()
    );

    let hold = args.hold_secs.map(Duration::from_secs);
    runtime.block_on(async {
        let scheduler = LeaseScheduler::start(settings.lease().refresh_rate);
        hold_until_done(&handle, hold).await;
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
    });

    if !handle.is_valid() {
        return Err(LockError::OwnershipLost(handle.path().to_path_buf()));
    }

    let path = handle.path().to_path_buf();
    handle.release()?;
    println!("Released lock: {}", path.display());
    Ok(())
}

async fn hold_until_done(handle: &LockHandle, hold: Option<Duration>) {
    let deadline = hold.map(|d| Instant::now() + d);
    let mut check = time::interval(VALIDITY_CHECK_INTERVAL);

    let interrupted = interrupted();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!(path = %handle.path().display(), "interrupted; releasing lock");
                break;
            }
            _ = sleep_until(deadline) => break,
            _ = check.tick() => {
                if !handle.is_valid() {
                    warn!(path = %handle.path().display(), "lock was lost while held");
                    break;
                }
            }
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal cannot be watched.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot watch for Ctrl-C");
        future::pending::<()>().await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
