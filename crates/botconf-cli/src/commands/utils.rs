use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use botconf_core::config::CoreConfig;
use botconf_core::session::SessionService;
use botconf_infrastructure::{BotconfPaths, TomlSessionStore, load_config};

/// Loads the configuration from `path` or the default location.
pub fn load(path: Option<&Path>) -> Result<CoreConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => BotconfPaths::default_config_file()?,
    };
    load_config(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Opens the session service over the configured store without starting
/// the scheduler.
pub async fn open_service(config: &CoreConfig) -> Result<SessionService> {
    let registry = Arc::new(config.schema_registry()?);
    let paths = BotconfPaths::from_settings(&config.storage)?;
    let service = SessionService::builder(registry, Arc::new(TomlSessionStore::at(&paths)))
        .settings(config.session.clone())
        .open()
        .await
        .with_context(|| format!("Failed to open store in {}", paths.data_dir().display()))?;
    Ok(service)
}
