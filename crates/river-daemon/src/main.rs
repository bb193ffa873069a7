//! jira-river daemon
//!
//! Mirrors issues from a JIRA-style tracker into a search backend, keeping
//! them fresh with periodic incremental updates and purging vanished
//! issues on full updates.
//!
//! # Usage
//!
//! ```bash
//! jira-river start [--config PATH] [--log-level LEVEL]
//! jira-river check-config [--config PATH]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/jira-river/config.toml)
//! 3. Environment variables (RIVER_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use river_daemon::{check_config, start_river, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            start_river(cli.config.as_deref(), cli.log_level.as_deref()).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config.as_deref())?;
        }
    }

    Ok(())
}
