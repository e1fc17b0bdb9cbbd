//! Configuration file loading.

use std::path::Path;

use imchat_types::config::AppConfig;
use imchat_types::{ImchatError, Result};

/// Loads and validates `path`, or returns the defaults when no file is
/// given. Keys missing from the file keep their default values.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        None => AppConfig::default(),
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| ImchatError::ConfigError {
                reason: format!("failed to read config file {}: {e}", path.display()),
            })?;
            serde_json::from_str(&raw).map_err(|e| ImchatError::ConfigError {
                reason: format!("failed to parse config file {}: {e}", path.display()),
            })?
        }
    };

    config.validate()?;
    Ok(config)
}
