use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hookci",
    about = "Webhook-triggered build and test runner",
    version
)]
pub struct Cli {
    /// Path to the config file (defaults to /etc/hookci/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the webhook server (systemd service mode)
    Serve,

    /// List recorded builds, most recent first
    History {
        /// Only show the N most recent builds
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show the recorded log for a commit
    Show {
        /// Commit identifier
        commit: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_show_with_global_config() {
        let cli = Cli::parse_from(["hookci", "show", "abc123", "--config", "/tmp/ci.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ci.toml")));
        assert!(matches!(cli.command, Commands::Show { ref commit } if commit == "abc123"));
    }

    #[test]
    fn test_parses_history_limit() {
        let cli = Cli::parse_from(["hookci", "history", "-n", "5"]);
        assert!(matches!(cli.command, Commands::History { limit: Some(5) }));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["hookci"]).is_err());
    }
}
