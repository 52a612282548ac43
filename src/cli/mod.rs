//! Command-line interface.
//!
//! Command definitions (clap) and the formatter that renders plans, results,
//! state and outputs as text or JSON.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
