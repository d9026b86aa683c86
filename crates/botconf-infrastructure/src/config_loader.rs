//! Loads `botconf.toml`.

use std::fs;
use std::path::Path;
use tracing::info;

use botconf_core::config::CoreConfig;
use botconf_core::error::{BotconfError, Result};

/// Reads and validates the configuration at `path`.
///
/// A missing file yields the defaults; a malformed or invalid one is a
/// `Config` error naming the file.
pub fn load_config(path: &Path) -> Result<CoreConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No configuration file, using defaults");
        return Ok(CoreConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config: CoreConfig = toml::from_str(&content)
        .map_err(|e| BotconfError::config(format!("{}: {}", path.display(), e)))?;
    config
        .validate()
        .map_err(|e| BotconfError::config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}
