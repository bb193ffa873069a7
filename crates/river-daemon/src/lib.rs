//! River daemon library: CLI definition and command implementations.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
pub use commands::{check_config, start_river};
