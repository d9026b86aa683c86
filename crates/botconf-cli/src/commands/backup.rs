use anyhow::Result;

use botconf_core::config::CoreConfig;

use super::utils::open_service;

pub async fn backup(config: CoreConfig) -> Result<()> {
    let service = open_service(&config).await?;
    service.backup().await?;
    println!("Backup written");
    Ok(())
}
