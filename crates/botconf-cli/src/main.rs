use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "botconf")]
#[command(about = "botconf - configuration session manager for group-management bots", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.config/botconf/botconf.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the session manager until interrupted
    Run,
    /// Validate the configuration and print the bot schemas
    Check,
    /// Print the stored settings of a group and the open sessions
    Show {
        #[arg(long, default_value = "warn")]
        bot_type: String,
        #[arg(long, allow_hyphen_values = true)]
        group_id: i64,
    },
    /// Copy the live store to the backup file now
    Backup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::utils::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => commands::run::run(config).await?,
        Commands::Check => commands::check::check(&config)?,
        Commands::Show { bot_type, group_id } => {
            commands::show::show(config, &bot_type, group_id).await?
        }
        Commands::Backup => commands::backup::backup(config).await?,
    }

    Ok(())
}
