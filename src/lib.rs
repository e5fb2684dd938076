//! Leaselock: lease-based cross-process file locks.
//!
//! Processes coordinate exclusive access to a path through a lock file. The
//! lock type is chosen once per process:
//!
//! - `advisory`: OS whole-file locks, for local filesystems
//! - `link_based`: atomic hard links renewed as leases, for network
//!   filesystems where advisory locks are unreliable
//!
//! A typical holder installs its settings, acquires through `FileLock`, and
//! runs a `LeaseScheduler` so its leases never expire while it is alive.

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod lock;
pub mod scheduler;

pub use error::{LockError, Result};
pub use lock::{FileLock, LockHandle};
pub use scheduler::{LeaseScheduler, SchedulerHandle};
