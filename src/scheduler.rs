//! Periodic lease refresh.
//!
//! One tokio task per process renews every held lock on a fixed interval.
//! Each tick runs `FileLock::refresh_all` on the blocking pool, since lease
//! renewal is synchronous filesystem work. A tick that fails, or panics, is
//! logged and the loop carries on with the next one.

use crate::lock::{FileLock, RefreshReport};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Starts the process-wide refresh task.
pub struct LeaseScheduler;

impl LeaseScheduler {
    /// Start renewing held leases every `refresh_rate`.
    ///
    /// Must be called from within a tokio runtime. Returns `None` if a
    /// scheduler is already running in this process, if there is no
    /// runtime, or if `refresh_rate` is zero.
    pub fn start(refresh_rate: Duration) -> Option<SchedulerHandle> {
        Self::start_with(refresh_rate, FileLock::refresh_all)
    }

    pub(crate) fn start_with<F>(refresh_rate: Duration, tick: F) -> Option<SchedulerHandle>
    where
        F: Fn() -> RefreshReport + Send + Sync + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "cannot start lease scheduler outside a tokio runtime");
                return None;
            }
        };

        if refresh_rate.is_zero() {
            error!("cannot start lease scheduler with a zero refresh rate");
            return None;
        }

        if RUNNING
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("lease scheduler already running");
            return None;
        }
        let running = RunningGuard;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run(refresh_rate, Arc::new(tick), shutdown_rx, running));

        info!(refresh_rate_ms = refresh_rate.as_millis() as u64, "started lease scheduler");
        Some(SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Whether a scheduler task is running in this process.
    pub fn is_running() -> bool {
        RUNNING.load(Ordering::SeqCst)
    }
}

async fn run<F>(
    refresh_rate: Duration,
    tick: Arc<F>,
    mut shutdown: oneshot::Receiver<()>,
    _running: RunningGuard,
) where
    F: Fn() -> RefreshReport + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + refresh_rate, refresh_rate);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Also fires when the handle is dropped without a shutdown.
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let tick = Arc::clone(&tick);
                match tokio::task::spawn_blocking(move || tick()).await {
                    Ok(report) => log_report(&report),
                    Err(e) => error!(error = %e, "lease refresh tick failed"),
                }
            }
        }
    }

    debug!("lease scheduler stopped");
}

fn log_report(report: &RefreshReport) {
    if report.is_clean() {
        debug!(refreshed = report.refreshed, "lease refresh tick");
    } else {
        warn!(
            refreshed = report.refreshed,
            lost = report.lost.len(),
            failed = report.failed.len(),
            "lease refresh tick had failures"
        );
    }
}

/// Clears the running flag when the task ends, however it ends.
struct RunningGuard;

impl Drop for RunningGuard {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::SeqCst);
    }
}

/// Owner of the running scheduler. Dropping it stops the task.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop the scheduler and wait for an in-flight tick to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(error = %e, "lease scheduler task failed");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LeaseConfig, LinkBasedFileLock};
    use serial_test::serial;
    use std::fs::File;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;
    use tempfile::TempDir;

    const RATE: Duration = Duration::from_millis(50);

    fn idle_tick() -> RefreshReport {
        RefreshReport::default()
    }

    #[tokio::test]
    #[serial]
    async fn second_start_returns_none() {
        let handle = LeaseScheduler::start_with(RATE, idle_tick).expect("first start");
        assert!(LeaseScheduler::is_running());
        assert!(LeaseScheduler::start_with(RATE, idle_tick).is_none());

        handle.shutdown().await;
        assert!(!LeaseScheduler::is_running());

        let restarted = LeaseScheduler::start_with(RATE, idle_tick).expect("restart after shutdown");
        restarted.shutdown().await;
    }

    #[tokio::test]
    #[serial]
    async fn panicking_tick_does_not_stop_the_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let handle = LeaseScheduler::start_with(RATE, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first tick fails");
            }
            RefreshReport::default()
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        handle.shutdown().await;

        assert!(ticks.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    #[serial]
    async fn dropped_handle_stops_the_task() {
        let handle = LeaseScheduler::start_with(RATE, idle_tick).unwrap();
        drop(handle);

        for _ in 0..50 {
            if !LeaseScheduler::is_running() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("scheduler still running after its handle was dropped");
    }

    #[tokio::test]
    #[serial]
    async fn scheduler_keeps_link_based_lease_fresh() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("leased.lock");
        let lock = LinkBasedFileLock::new(LeaseConfig::default());
        let handle = lock.acquire(&path).unwrap();

        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(25))
            .unwrap();

        let scheduler = LeaseScheduler::start(RATE).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.shutdown().await;

        let age = SystemTime::now()
            .duration_since(std::fs::metadata(&path).unwrap().modified().unwrap())
            .unwrap_or(Duration::ZERO);
        assert!(age < Duration::from_secs(5));
        assert!(handle.is_valid());

        handle.release().unwrap();
    }

    #[test]
    #[serial]
    fn start_outside_runtime_returns_none() {
        assert!(LeaseScheduler::start(RATE).is_none());
        assert!(!LeaseScheduler::is_running());
    }

    #[tokio::test]
    #[serial]
    async fn zero_rate_is_rejected() {
        assert!(LeaseScheduler::start_with(Duration::ZERO, idle_tick).is_none());
        assert!(!LeaseScheduler::is_running());
    }
}
