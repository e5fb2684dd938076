//! Command implementations for leaselock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, after fixing the process lock settings.

mod acquire;
mod clear;
mod status;

use crate::cli::{Cli, Command};
use leaselock::FileLock;
use leaselock::config::{self, LockSettings, LockType};
use leaselock::error::Result;
use std::path::Path;
use tracing::debug;

/// Dispatch a command to its implementation.
///
/// Settings come from `--config` (or defaults) with `--lock-type` applied on
/// top, and are installed for the process before the command runs.
pub fn dispatch(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref(), cli.lock_type)?;
    config::install(settings)?;
    let lock = FileLock::create();

    match cli.command {
        Command::Acquire(args) => acquire::cmd_acquire(args, &lock, config::current()),
        Command::Status(args) => status::cmd_status(args, &lock),
        Command::Clear(args) => clear::cmd_clear(args, &lock),
    }
}

fn load_settings(path: Option<&Path>, lock_type: Option<LockType>) -> Result<LockSettings> {
    let mut settings = match path {
        Some(path) => LockSettings::load(path)?,
        None => LockSettings::default(),
    };

    if let Some(lock_type) = lock_type {
        debug!(lock_type = %lock_type, "lock type overridden on the command line");
        settings.lock_type = lock_type;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaselock::error::LockError;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_config_file() {
        let settings = load_settings(None, None).unwrap();
        assert_eq!(settings, LockSettings::default());
    }

    #[test]
    fn lock_type_flag_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locks.yaml");
        std::fs::write(&path, "lock_type: advisory\ntimeout_interval_secs: 90\n").unwrap();

        let settings = load_settings(Some(&path), Some(LockType::LinkBased)).unwrap();
        assert_eq!(settings.lock_type, LockType::LinkBased);
        assert_eq!(settings.timeout_interval_secs, 90);
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let temp = TempDir::new().unwrap();
        let err = load_settings(Some(&temp.path().join("absent.yaml")), None).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }
}
