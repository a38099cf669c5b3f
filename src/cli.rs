use clap::{Parser, Subcommand};

use crate::domain::{GridId, DEFAULT_GRID_ID};

#[derive(Parser, Debug)]
#[command(name = "squarepool")]
#[command(version, about = "Football squares pool for fundraisers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding default.toml and per-environment overrides
    #[arg(short, long, env = "SQUARES_CONFIG_DIR", default_value = "config")]
    pub config: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Fetch live scores for a grid once and print them
    Live {
        /// Grid to look up
        #[arg(short, long, default_value_t = DEFAULT_GRID_ID)]
        grid: GridId,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_serve() {
        let cli = Cli::parse_from(["squarepool"]);
        assert_eq!(cli.command(), Commands::Serve);
        assert_eq!(cli.config, "config");
    }

    #[test]
    fn test_live_grid_flag() {
        let cli =
            Cli::parse_from(["squarepool", "--config", "/etc/squares", "live", "--grid", "3"]);
        assert_eq!(cli.command(), Commands::Live { grid: 3 });
        assert_eq!(cli.config, "/etc/squares");
    }
}
