//! CLI module for ShipShow.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::config::Settings;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ShipShow - Multi-agent Marketing Video Pipeline
///
/// Turns a product brief into researched, scripted, voiced and rendered
/// short-form videos by handing the work from one agent to the next.
#[derive(Parser, Debug)]
#[command(name = "shipshow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The configuration file in use: `--config` if given, else the default.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_config_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent pipeline on a brief and print each event as it happens
    Run {
        /// The brief, e.g. a product URL and the platforms to target
        prompt: String,

        /// Print the aggregated result as JSON instead of streaming progress
        #[arg(long)]
        json: bool,

        /// Override the step ceiling for this run
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Start HTTP API server with streaming run events
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the agents, their tools and their handoff targets
    Agents,

    /// Show past runs from the audit log
    History {
        /// Show the full transcript of one run
        run_id: Option<String>,

        /// Maximum number of runs to list
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_follows_flag() {
        let cli = Cli::try_parse_from(["shipshow", "--config", "/tmp/shipshow.toml", "config", "path"]).unwrap();
        assert_eq!(cli.config_path(), PathBuf::from("/tmp/shipshow.toml"));

        let cli = Cli::try_parse_from(["shipshow", "config", "path"]).unwrap();
        assert_eq!(cli.config_path(), Settings::default_config_path());
    }
}
