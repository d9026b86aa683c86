use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use botconf_application::{LoggingNotifier, Runtime, init_tracing};
use botconf_core::config::CoreConfig;
use botconf_infrastructure::BotconfPaths;

pub async fn run(config: CoreConfig) -> Result<()> {
    let paths = BotconfPaths::from_settings(&config.storage)?;
    let _telemetry = init_tracing(Some(&paths.log_dir()));

    let runtime = Runtime::start(config, Arc::new(LoggingNotifier)).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    runtime.shutdown().await
}
