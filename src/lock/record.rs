//! On-disk lock record.

use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

/// Lock record stored as JSON in lock files.
///
/// The record identifies the holder; it never carries the refresh time. For
/// the link-based strategy the file's mtime is the last-refresh timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Unique id of this acquisition. Decides ownership on refresh and release.
    pub owner_id: String,

    /// Human-readable holder (e.g., `user@HOST`).
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was acquired (RFC3339).
    pub acquired_at: DateTime<Utc>,
}

impl LockRecord {
    /// Create a record for a new acquisition by this process.
    pub fn new() -> Self {
        Self {
            owner_id: uuid::Uuid::new_v4().simple().to_string(),
            owner: get_owner_string(),
            pid: Some(std::process::id()),
            acquired_at: Utc::now(),
        }
    }

    /// Serialize the record to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LockError::UserError(format!("failed to serialize lock record: {}", e)))
    }

    /// Read a record from an open lock file.
    ///
    /// I/O failures are returned. Content that does not parse as a record
    /// yields `Ok(None)`: the file still exists and still counts as a lock.
    pub fn read_from<R: Read>(mut reader: R) -> std::io::Result<Option<Self>> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                debug!(error = %e, "lock file does not contain a readable record");
                Ok(None)
            }
        }
    }
}

impl Default for LockRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the owner string for lock records.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_records_have_unique_owner_ids() {
        let a = LockRecord::new();
        let b = LockRecord::new();
        assert_ne!(a.owner_id, b.owner_id);
        assert_eq!(a.pid, Some(std::process::id()));
        assert!(a.owner.contains('@'));
    }

    #[test]
    fn record_json_names_its_fields() {
        let record = LockRecord::new();
        let json = record.to_json().unwrap();

        assert!(json.contains("owner_id"));
        assert!(json.contains("acquired_at"));

        let parsed = LockRecord::read_from(json.as_bytes()).unwrap();
        assert_eq!(parsed, Some(record));
    }

    #[test]
    fn garbage_content_is_not_a_record() {
        assert_eq!(LockRecord::read_from(&b"not json"[..]).unwrap(), None);
        assert_eq!(LockRecord::read_from(&b""[..]).unwrap(), None);
    }

    #[test]
    fn pid_is_optional_on_read() {
        let json = r#"{"owner_id":"abc","owner":"bob@host","acquired_at":"2026-01-01T00:00:00Z"}"#;
        let record = LockRecord::read_from(json.as_bytes()).unwrap().unwrap();
        assert_eq!(record.owner_id, "abc");
        assert_eq!(record.pid, None);
    }
}
