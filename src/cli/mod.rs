pub mod commands;
pub mod display;

use crate::cli::commands::Commands;
use crate::config::GlobalConfig;
use crate::store::BuildHistoryStore;

/// Handle the read-only subcommands against the local build history
pub async fn handle_command(cmd: Commands, config: &GlobalConfig) -> anyhow::Result<()> {
    match cmd {
        Commands::Serve => unreachable!(),
        Commands::History { limit } => {
            let store = BuildHistoryStore::open(&config.database.path)?;
            let mut builds = store.get_all().await?;
            if let Some(n) = limit {
                builds.truncate(n);
            }
            println!();
            display::print_build_table(&builds);
            println!();
        }
        Commands::Show { commit } => {
            let store = BuildHistoryStore::open(&config.database.path)?;
            match store.get_by_commit_id(&commit).await? {
                Some(build) => display::print_build_detail(&build),
                None => anyhow::bail!("No build recorded for commit '{}'", commit),
            }
        }
    }
    Ok(())
}
