//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Scenario;

/// Dependency-ordered deployment of a GKE load-testing topology.
#[derive(Parser, Debug)]
#[command(name = "loadtest-deploy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "LOADTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use a built-in scenario instead of a configuration file.
    #[arg(short, long, global = true, conflicts_with = "config")]
    pub scenario: Option<Scenario>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration file for a scenario.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Scenario to start from.
        #[arg(long, default_value = "autoscaled")]
        from: Scenario,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the topology configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the resource graph and what an apply would change.
    Plan {
        /// Show the dependency graph.
        #[arg(short, long)]
        detailed: bool,

        /// Plan against an empty in-memory platform.
        #[arg(long)]
        simulate: bool,
    },

    /// Create or update every resource in dependency order.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Run against an in-memory platform without touching state.
        #[arg(long)]
        simulate: bool,
    },

    /// Write the credential document of the deployed cluster.
    Kubeconfig {
        /// File to write (prints to stdout when omitted).
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
    },

    /// Print exported outputs.
    Output {
        /// Single output to print (such as `url`).
        name: Option<String>,
    },

    /// Delete every recorded resource in reverse dependency order.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Apply and then destroy the stack on an in-memory platform.
        #[arg(long)]
        simulate: bool,
    },

    /// Manage state backend.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
