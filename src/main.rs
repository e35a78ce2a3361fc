mod cli;
mod config;
mod daemon;
mod error;
mod models;
mod pipeline;
mod status;
mod store;
mod utils;

use clap::Parser;
use cli::commands::{Cli, Commands};
use config::GlobalConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GlobalConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.server.log_level.as_str().into()),
                )
                .init();
            daemon::run(config).await?;
        }
        cmd => {
            cli::handle_command(cmd, &config).await?;
        }
    }

    Ok(())
}
