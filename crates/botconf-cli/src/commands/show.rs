use anyhow::Result;

use botconf_core::config::CoreConfig;

use super::utils::open_service;

pub async fn show(config: CoreConfig, bot_type: &str, group_id: i64) -> Result<()> {
    let service = open_service(&config).await?;

    let settings = service.authoritative(bot_type, group_id).await?;
    println!("# {} in group {}", bot_type, group_id);
    print!("{}", toml::to_string_pretty(&settings)?);

    let active: Vec<_> = service
        .list_active()
        .await
        .into_iter()
        .filter(|view| view.bot_type == bot_type && view.group_id == group_id)
        .collect();
    for view in active {
        let changed: Vec<String> = view.changed.iter().map(|p| p.to_string()).collect();
        println!();
        println!(
            "# open session {} ({}, expires {}), changed: {}",
            view.token,
            view.state,
            view.expires_at,
            changed.join(", ")
        );
    }

    Ok(())
}
