//! Configuration types and defaults for leaselock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Locking mechanism used by every lock created in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// OS advisory lock (`flock` / `LockFileEx`) held for the life of a descriptor.
    ///
    /// Unreliable or unsupported on some network filesystems.
    #[default]
    Advisory,
    /// Atomic hard-link of a lock record into place, renewed as a lease.
    LinkBased,
}

impl LockType {
    /// Config and CLI spelling of this lock type.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Advisory => "advisory",
            LockType::LinkBased => "link_based",
        }
    }

    /// Parse a lock type from its config or CLI spelling.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "advisory" => Some(Self::Advisory),
            "link_based" | "link-based" | "linkbased" => Some(Self::LinkBased),
            _ => None,
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lease timing shared by the link-based strategy and the refresh scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Age after which an unrefreshed lock is considered abandoned.
    pub timeout_interval: Duration,
    /// Interval between scheduler refresh ticks. Should be below `timeout_interval`.
    pub refresh_rate: Duration,
}

impl LeaseConfig {
    pub fn new(timeout_interval: Duration, refresh_rate: Duration) -> Self {
        Self {
            timeout_interval,
            refresh_rate,
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            timeout_interval: Duration::from_secs(default_timeout_interval_secs()),
            refresh_rate: Duration::from_secs(default_refresh_rate_secs()),
        }
    }
}

// Default value functions for serde
pub(crate) fn default_timeout_interval_secs() -> u64 {
    30
}
pub(crate) fn default_refresh_rate_secs() -> u64 {
    20
}
