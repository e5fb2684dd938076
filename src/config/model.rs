//! LockSettings struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Process-wide lock settings.
///
/// Usually loaded from a YAML file such as:
///
/// ```yaml
/// lock_type: link_based
/// timeout_interval_secs: 30
/// refresh_rate_secs: 20
/// ```
///
/// Unknown fields are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Locking mechanism used by `FileLock::create`.
    pub lock_type: LockType,

    /// Seconds after which an unrefreshed link-based lock may be reclaimed.
    #[serde(default = "default_timeout_interval_secs")]
    pub timeout_interval_secs: u64,

    /// Seconds between lease refresh ticks.
    #[serde(default = "default_refresh_rate_secs")]
    pub refresh_rate_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            lock_type: LockType::default(),
            timeout_interval_secs: default_timeout_interval_secs(),
            refresh_rate_secs: default_refresh_rate_secs(),
        }
    }
}
