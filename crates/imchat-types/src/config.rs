//! Application configuration with sensible defaults.
//!
//! Operational parameters of the session and sync loop live here.
//! The KDF salt and iteration count are not configurable; they are
//! fixed in `imchat-crypto`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ImchatError, Result};

/// Global application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interval between sync passes of the active conversation, in
    /// milliseconds.
    pub poll_interval_ms: u64,

    /// Application name embedded in the login message the wallet signs.
    /// Changing it changes every derived key.
    pub app_name: String,

    /// Prefix of the placeholder display name shown for identities
    /// without a saved profile.
    pub default_display_name_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            app_name: "ImChat Pro".into(),
            default_display_name_prefix: "User".into(),
        }
    }
}

impl AppConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ImchatError::ConfigError {
                reason: "poll_interval_ms must be greater than 0".into(),
            });
        }

        if self.app_name.trim().is_empty() {
            return Err(ImchatError::ConfigError {
                reason: "app_name must not be empty".into(),
            });
        }

        Ok(())
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
