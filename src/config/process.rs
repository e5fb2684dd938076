//! Process-wide settings, fixed on first use.

use super::model::LockSettings;
use crate::error::{LockError, Result};
use std::sync::OnceLock;
use tracing::debug;

static PROCESS_SETTINGS: OnceLock<LockSettings> = OnceLock::new();

/// Fix the settings for this process.
///
/// Must run before the first `FileLock::create` or `current` call. Fails if
/// settings were already installed or already read with their defaults.
pub fn install(settings: LockSettings) -> Result<()> {
    install_into(&PROCESS_SETTINGS, settings)
}

/// The settings in force for this process. Defaults are fixed on first read.
pub fn current() -> &'static LockSettings {
    PROCESS_SETTINGS.get_or_init(LockSettings::default)
}

fn install_into(cell: &OnceLock<LockSettings>, settings: LockSettings) -> Result<()> {
    settings.validate()?;
    debug!(lock_type = %settings.lock_type, "installing process lock settings");
    cell.set(settings).map_err(|_| {
        LockError::Config("lock settings are already fixed for this process".to_string())
    })
}
