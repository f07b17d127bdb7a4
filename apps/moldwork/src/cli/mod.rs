//! # Moldwork CLI Module
//!
//! ## Available Commands
//!
//! - `list` - Enumerate the configs (or molds) of a group
//! - `verify` - Verify configs against their molds, or molds on their own
//! - `generate` - Write a config holding a mold's defaults
//! - `update` - Migrate a config to a newer mold version

mod commands;

use crate::settings::Settings;
use clap::{Parser, Subcommand};
use moldwork_core::{MoldError, Version};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Moldwork - versioned configuration schemas
///
/// Verifies configs against their molds and migrates them between mold versions.
#[derive(Parser, Debug)]
#[command(name = "moldwork")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the settings file
    #[arg(short = 'S', long, global = true, default_value = "moldwork.toml")]
    pub settings: PathBuf,

    /// Plugin group to work on
    #[arg(short, long, global = true, default_value = "default")]
    pub group: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the entries of the group
    List {
        /// List molds instead of configs
        #[arg(long)]
        mold: bool,
    },

    /// Verify entries (all of them when none are named)
    Verify {
        /// Verify molds instead of configs
        #[arg(long)]
        mold: bool,

        /// Entry names
        entries: Vec<String>,
    },

    /// Generate a config from the mold of the same name
    Generate {
        /// Entry name
        entry: String,

        /// Version to generate at (defaults to the mold's version)
        #[arg(long)]
        at: Option<Version>,
    },

    /// Migrate a config to a newer mold version
    Update {
        /// Entry name
        entry: String,

        /// Target version
        #[arg(short, long)]
        target: Version,

        /// Conflict resolution as NAME=VALUE (repeatable)
        #[arg(short, long = "resolve", value_parser = parse_resolution)]
        resolve: Vec<(String, String)>,
    },
}

/// Parse a `NAME=VALUE` pair.
fn parse_resolution(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", text)),
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), MoldError> {
    let settings = Settings::load(&cli.settings)?;
    let mut instance = settings.instance()?;
    let group = cli.group.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::List { mold } => cmd_list(&mut instance, group, json_mode, cli.verbose, mold),
        Commands::Verify { mold, entries } => {
            cmd_verify(&mut instance, group, json_mode, cli.verbose, mold, &entries)
        }
        Commands::Generate { entry, at } => cmd_generate(&mut instance, group, json_mode, &entry, at),
        Commands::Update {
            entry,
            target,
            resolve,
        } => cmd_update(&mut instance, group, json_mode, &entry, target, &resolve),
    }
}
