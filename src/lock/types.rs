//! Diagnostic and reporting types for locks.

use super::record::LockRecord;
use crate::config::LockType;
use crate::error::LockError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// The holder of a contended lock, as far as its file reveals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    /// Acquisition id, if the lock file holds a readable record.
    pub owner_id: Option<String>,
    pub owner: Option<String>,
    pub pid: Option<u32>,
    /// Last refresh time (the lock file's mtime).
    pub last_refresh: DateTime<Utc>,
}

impl LockHolder {
    pub(crate) fn new(record: Option<&LockRecord>, last_refresh: DateTime<Utc>) -> Self {
        Self {
            owner_id: record.map(|r| r.owner_id.clone()),
            owner: record.map(|r| r.owner.clone()),
            pid: record.and_then(|r| r.pid),
            last_refresh,
        }
    }
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner: {}", self.owner.as_deref().unwrap_or("unknown"))?;
        if let Some(pid) = self.pid {
            write!(f, ", pid: {}", pid)?;
        }
        write!(
            f,
            ", refreshed {} ago",
            format_age(Utc::now().signed_duration_since(self.last_refresh))
        )
    }
}

/// Information about a lock file, for status reporting.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The lock file path.
    pub path: PathBuf,

    /// Strategy the lock was inspected with.
    pub lock_type: LockType,

    /// The record in the lock file, if readable.
    pub record: Option<LockRecord>,

    /// Last refresh time (the lock file's mtime).
    pub last_refresh: DateTime<Utc>,

    /// Whether some process currently holds the lock.
    pub held: bool,

    /// Whether the lease has expired (link-based only).
    pub is_stale: bool,
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_stale {
            "STALE"
        } else if self.held {
            "held"
        } else {
            "free"
        };
        write!(f, "{} [{}, {}]", self.path.display(), self.lock_type, state)?;
        if let Some(record) = &self.record {
            write!(
                f,
                " (owner: {}, pid: {}, acquired {} ago",
                record.owner,
                record
                    .pid
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                format_age(Utc::now().signed_duration_since(record.acquired_at)),
            )?;
        } else {
            write!(f, " (owner: unknown")?;
        }
        write!(
            f,
            ", refreshed {} ago)",
            format_age(Utc::now().signed_duration_since(self.last_refresh))
        )
    }
}

/// Outcome of one refresh pass over a registry.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Number of locks whose lease was renewed.
    pub refreshed: usize,
    /// Locks found stolen or deleted; their entries are gone.
    pub lost: Vec<PathBuf>,
    /// Locks whose refresh failed transiently; they stay registered.
    pub failed: Vec<(PathBuf, LockError)>,
}

impl RefreshReport {
    pub fn merge(&mut self, other: RefreshReport) {
        self.refreshed += other.refreshed;
        self.lost.extend(other.lost);
        self.failed.extend(other.failed);
    }

    pub fn is_clean(&self) -> bool {
        self.lost.is_empty() && self.failed.is_empty()
    }
}

/// Format an age as a short human-readable string.
pub(crate) fn format_age(age: chrono::Duration) -> String {
    let seconds = age.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
