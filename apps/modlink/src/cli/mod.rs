//! # modlink CLI Module
//!
//! This module implements the CLI interface for modlink.
//!
//! ## Available Commands
//!
//! - `run` - Resolve a graph of units starting from one or more entries
//! - `resolve` - Show the canonical identifier of a specifier

mod commands;

use crate::error::AppError;
use clap::{Parser, Subcommand};
use modlink_core::{CyclePolicy, FailurePolicy};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// modlink - asynchronous module resolution
///
/// Loads each dependency exactly once and runs every unit only after its
/// whole dependency graph has resolved.
#[derive(Parser, Debug)]
#[command(name = "modlink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long = "json", global = true)]
    pub json_mode: bool,

    /// Path to the TOML config file (default: modlink.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register entry units in order and resolve everything they depend on
    Run {
        /// Entry unit files (or absolute locators)
        #[arg(required = true)]
        entries: Vec<String>,

        /// Directory relative entry paths are taken from
        #[arg(short, long, default_value = ".")]
        base_dir: PathBuf,

        /// Cycle policy (break, wait); overrides the config file
        #[arg(long)]
        cycle_policy: Option<CyclePolicy>,

        /// Failure policy (strand, propagate); overrides the config file
        #[arg(long)]
        failure_policy: Option<FailurePolicy>,
    },

    /// Normalize a specifier
    Resolve {
        /// Absolute locator, or relative specifier when --base is given
        specifier: String,

        /// Base identifier for relative specifiers
        #[arg(short, long)]
        base: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Run {
            entries,
            base_dir,
            cycle_policy,
            failure_policy,
        } => {
            let mut config = crate::config::AppConfig::load(cli.config.as_deref())?;
            if let Some(policy) = cycle_policy {
                config.resolver.cycle_policy = policy;
            }
            if let Some(policy) = failure_policy {
                config.resolver.failure_policy = policy;
            }
            cmd_run(&entries, &base_dir, &config, json_mode, cli.verbose).await
        }
        Commands::Resolve { specifier, base } => {
            cmd_resolve(&specifier, base.as_deref(), json_mode)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
