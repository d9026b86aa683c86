use anyhow::Result;

use botconf_core::config::CoreConfig;
use botconf_infrastructure::BotconfPaths;

pub fn check(config: &CoreConfig) -> Result<()> {
    config.validate()?;
    let registry = config.schema_registry()?;
    let paths = BotconfPaths::from_settings(&config.storage)?;

    println!("Configuration OK");
    println!("Data directory: {}", paths.data_dir().display());
    println!(
        "Session TTL: {}s, lock timeout: {}ms",
        config.session.ttl_secs, config.session.lock_timeout_ms
    );

    for bot_type in registry.bot_types() {
        let schema = registry.get(bot_type)?;
        let resets: Vec<String> = schema.reset_fields().iter().map(|p| p.to_string()).collect();
        println!();
        println!("[{}] reset fields: {}", bot_type, resets.join(", "));
        print!("{}", toml::to_string_pretty(schema.defaults())?);
    }

    Ok(())
}
