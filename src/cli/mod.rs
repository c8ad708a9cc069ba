//! Command-line interface for agentrace
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, config discovery, dispatch and error output
//! - `commands`: one handler per subcommand

pub mod args;
mod commands;
mod run;


pub use args::{Cli, Commands};
pub use run::run;
