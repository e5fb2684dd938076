//! Error types for leaselock.
//!
//! Uses thiserror for derive macros. Every variant maps to a process exit code
//! so the CLI can report lock contention distinctly from filesystem failures.

use crate::exit_codes;
use crate::lock::LockHolder;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another live holder owns the lock. Expected; the caller decides whether to retry.
    #[error("lock '{}' is held by another process{}", .path.display(), holder_suffix(.holder))]
    Unavailable {
        path: PathBuf,
        holder: Option<LockHolder>,
    },

    /// Filesystem failure while opening, reading, or writing lock state.
    #[error("I/O error on lock '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The lease was stolen or its backing file vanished.
    #[error("ownership of lock '{}' was lost", .0.display())]
    OwnershipLost(PathBuf),

    /// Lock settings are invalid or were already fixed for this process.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller asked for something the current state does not allow.
    #[error("{0}")]
    UserError(String),
}

impl LockError {
    /// Wrap an `io::Error` with the lock path it concerns.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        LockError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build an `Unavailable` error for `path`.
    pub fn unavailable(path: impl AsRef<Path>, holder: Option<LockHolder>) -> Self {
        LockError::Unavailable {
            path: path.as_ref().to_path_buf(),
            holder,
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::Unavailable { .. } => exit_codes::LOCK_UNAVAILABLE,
            LockError::Io { .. } => exit_codes::IO_FAILURE,
            LockError::OwnershipLost(_) => exit_codes::OWNERSHIP_LOST,
            LockError::Config(_) => exit_codes::USER_ERROR,
            LockError::UserError(_) => exit_codes::USER_ERROR,
        }
    }
}

fn holder_suffix(holder: &Option<LockHolder>) -> String {
    match holder {
        Some(holder) => format!(" ({})", holder),
        None => String::new(),
    }
}

/// Result type alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
