//! Settings loading, validation, and conversion.

use super::model::LockSettings;
use super::types::LeaseConfig;
use crate::error::{LockError, Result};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

impl LockSettings {
    /// Load settings from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(LockSettings)` - Successfully loaded and validated settings
    /// * `Err(LockError::Config)` - Read error, parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string. An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: LockSettings = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Serialize settings to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate settings.
    ///
    /// Both intervals must be positive. A refresh rate that is not below the
    /// timeout is allowed but logged, since holders would then race their own
    /// expiry.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_interval_secs == 0 {
            return Err(LockError::Config(
                "timeout_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.refresh_rate_secs == 0 {
            return Err(LockError::Config(
                "refresh_rate_secs must be greater than 0".to_string(),
            ));
        }

        if self.refresh_rate_secs >= self.timeout_interval_secs {
            warn!(
                refresh_rate_secs = self.refresh_rate_secs,
                timeout_interval_secs = self.timeout_interval_secs,
                "refresh rate is not below the lock timeout; held locks may be reclaimed by peers"
            );
        }

        Ok(())
    }

    /// Lease timing described by these settings.
    pub fn lease(&self) -> LeaseConfig {
        LeaseConfig::new(
            Duration::from_secs(self.timeout_interval_secs),
            Duration::from_secs(self.refresh_rate_secs),
        )
    }
}
