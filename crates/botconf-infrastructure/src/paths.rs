//! Path management for botconf files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/botconf/
//! └── botconf.toml             # Configuration
//!
//! ~/.local/share/botconf/      # Data directory (overridable via [storage])
//! ├── store.toml               # Live store
//! ├── store.backup.toml        # Nightly backup
//! └── logs/
//!     └── botconf.log.YYYY-MM-DD
//! ```

use std::path::{Path, PathBuf};

use botconf_core::config::StorageSettings;

pub const APP_DIR: &str = "botconf";
pub const CONFIG_FILE: &str = "botconf.toml";
pub const STORE_FILE: &str = "store.toml";
pub const BACKUP_FILE: &str = "store.backup.toml";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// No platform data or config directory could be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for botconf_core::BotconfError {
    fn from(e: PathError) -> Self {
        botconf_core::BotconfError::config(e.to_string())
    }
}

/// Resolved locations of the store and log files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotconfPaths {
    data_dir: PathBuf,
}

impl BotconfPaths {
    /// Uses `data_dir` as the data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolves the data directory from `[storage]`, falling back to the
    /// platform data directory.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, PathError> {
        match &settings.data_dir {
            Some(dir) => Ok(Self::new(dir.clone())),
            None => Ok(Self::new(Self::default_data_dir()?)),
        }
    }

    /// e.g. `~/.local/share/botconf/`
    pub fn default_data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// e.g. `~/.config/botconf/botconf.toml`
    pub fn default_config_file() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    pub fn backup_file(&self) -> PathBuf {
        self.data_dir.join(BACKUP_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
