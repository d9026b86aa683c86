//! TOML-file implementation of [`SessionStore`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use botconf_core::error::{BotconfError, Result};
use botconf_core::store::{SessionStore, StoreSnapshot};

use crate::paths::BotconfPaths;
use crate::storage::{AtomicTomlFile, StoreFileError};

impl From<StoreFileError> for BotconfError {
    fn from(e: StoreFileError) -> Self {
        match e {
            StoreFileError::Io(e) => BotconfError::from(e),
            StoreFileError::Parse(e) => BotconfError::from(e),
            StoreFileError::Serialize(e) => BotconfError::from(e),
            StoreFileError::Lock(message) => BotconfError::io(message),
            StoreFileError::Empty(path) => {
                BotconfError::StoreCorruption(format!("{} exists but is empty", path.display()))
            }
        }
    }
}

/// Session store backed by a live file and a backup file holding the full
/// [`StoreSnapshot`].
///
/// All file I/O runs on the blocking pool.
#[derive(Clone)]
pub struct TomlSessionStore {
    primary: Arc<AtomicTomlFile<StoreSnapshot>>,
    backup: Arc<AtomicTomlFile<StoreSnapshot>>,
}

impl TomlSessionStore {
    pub fn new(primary: PathBuf, backup: PathBuf) -> Self {
        Self {
            primary: Arc::new(AtomicTomlFile::new(primary)),
            backup: Arc::new(AtomicTomlFile::new(backup)),
        }
    }

    /// Store using `store.toml` and `store.backup.toml` in the data directory.
    pub fn at(paths: &BotconfPaths) -> Self {
        Self::new(paths.store_file(), paths.backup_file())
    }

    /// The store starts empty only when neither file exists. An empty or
    /// unparsable file counts as damaged, never as absent.
    fn load_blocking(
        primary: &AtomicTomlFile<StoreSnapshot>,
        backup: &AtomicTomlFile<StoreSnapshot>,
    ) -> Result<StoreSnapshot> {
        let primary_error = match primary.load() {
            Ok(Some(snapshot)) => return Ok(snapshot),
            Ok(None) => None,
            Err(e) => {
                warn!(path = %primary.path().display(), error = %e, "Live store unreadable, trying backup");
                Some(e)
            }
        };

        match (backup.load(), primary_error) {
            (Ok(Some(snapshot)), _) => {
                warn!(path = %backup.path().display(), "Store recovered from backup");
                Ok(snapshot)
            }
            (Ok(None), None) => {
                info!(path = %primary.path().display(), "No store found, starting empty");
                Ok(StoreSnapshot::default())
            }
            (Ok(None), Some(primary_error)) => Err(BotconfError::StoreCorruption(format!(
                "{}: {}; no backup at {}",
                primary.path().display(),
                primary_error,
                backup.path().display()
            ))),
            (Err(backup_error), primary_error) => Err(BotconfError::StoreCorruption(format!(
                "{}: {}; {}: {}",
                primary.path().display(),
                primary_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "missing".to_string()),
                backup.path().display(),
                backup_error
            ))),
        }
    }
}

async fn write(file: Arc<AtomicTomlFile<StoreSnapshot>>, snapshot: &StoreSnapshot) -> Result<()> {
    let snapshot = snapshot.clone();
    tokio::task::spawn_blocking(move || file.save(&snapshot))
        .await
        .map_err(|e| BotconfError::internal(format!("Failed to join task: {}", e)))??;
    Ok(())
}

#[async_trait]
impl SessionStore for TomlSessionStore {
    async fn load(&self) -> Result<StoreSnapshot> {
        let primary = self.primary.clone();
        let backup = self.backup.clone();
        tokio::task::spawn_blocking(move || Self::load_blocking(&primary, &backup))
            .await
            .map_err(|e| BotconfError::internal(format!("Failed to join task: {}", e)))?
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        write(self.primary.clone(), snapshot).await
    }

    async fn backup(&self, snapshot: &StoreSnapshot) -> Result<()> {
        write(self.backup.clone(), snapshot).await
    }
}
