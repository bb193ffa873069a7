//! CLI argument parsing for the river daemon.

use clap::{Parser, Subcommand};

/// jira-river daemon
///
/// Mirrors issues from a JIRA-style tracker into a search backend.
#[derive(Parser, Debug)]
#[command(name = "jira-river")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/jira-river/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the river in the foreground
    Start,

    /// Validate the configuration and print the effective setup
    CheckConfig,
}
