use clap::{Parser, Subcommand};

pub mod config;
pub mod run;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "holdout")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for the holdout giveaway bot", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the giveaway bot service
    Run {
        /// Path to config file (default: ~/.local/share/holdout/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Show the persisted giveaway state
    Status {
        /// Path to config file (default: ~/.local/share/holdout/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config } => run::execute(config).await,
        Commands::Status { config } => status::execute(config).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::parse_from(["holdout", "run"]);
        match cli.command {
            Commands::Run { config } => assert_eq!(config, None),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_with_config() {
        let cli = Cli::parse_from(["holdout", "run", "--config", "/etc/holdout/config.toml"]);
        match cli.command {
            Commands::Run { config } => {
                assert_eq!(config, Some("/etc/holdout/config.toml".to_string()));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["holdout", "status"]);
        assert!(matches!(cli.command, Commands::Status { config: None }));
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["holdout", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }
}
