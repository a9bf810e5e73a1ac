//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::pilot::RaceEntry;

/// First-run seeding arguments.
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Races generated per pilot (defaults to the configured value)
    #[arg(short, long)]
    pub races: Option<usize>,

    /// Number of pilots (random within the configured bounds when omitted)
    #[arg(short, long)]
    pub pilots: Option<usize>,

    /// Seed for reproducible data
    #[arg(short, long)]
    pub seed: Option<u64>,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Pilots to show, by 1-based index or by name
    #[arg(required = true, value_name = "PILOT")]
    pub pilots: Vec<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stat command arguments.
#[derive(Debug, Args)]
pub struct StatCommand {
    /// Statistic to print, by column header or field name
    pub statistic: String,

    /// Pilots to include, by 1-based index or by name
    #[arg(required = true, value_name = "PILOT")]
    pub pilots: Vec<String>,
}

/// Race command arguments.
#[derive(Debug, Args)]
pub struct RaceCommand {
    /// Generate every result
    #[arg(short, long, conflicts_with = "entries")]
    pub random: bool,

    /// Seed for generated results
    #[arg(short, long, requires = "random")]
    pub seed: Option<u64>,

    /// One result per pilot in index order, as POSITION,AVERAGE,MAX
    #[arg(
        short,
        long = "entry",
        value_name = "POS,AVG,MAX",
        value_parser = parse_entry,
        required_unless_present = "random"
    )]
    pub entries: Vec<RaceEntry>,
}

/// Check command arguments.
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Recompute drifted averages from each pilot's history
    #[arg(long)]
    pub repair: bool,
}

/// Reset command arguments.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Parse `POSITION,AVERAGE,MAX` into an unvalidated entry.
///
/// Domain rules are checked later by the store, which names the pilot.
///
/// # Errors
///
/// Returns a message if the value does not hold three numbers.
pub fn parse_entry(value: &str) -> Result<RaceEntry, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [position, average, max] = parts.as_slice() else {
        return Err(format!(
            "expected POSITION,AVERAGE,MAX but got {} fields",
            parts.len()
        ));
    };

    let position = position
        .parse::<u32>()
        .map_err(|e| format!("invalid position '{position}': {e}"))?;
    let average = average
        .parse::<f64>()
        .map_err(|e| format!("invalid average speed '{average}': {e}"))?;
    let max = max
        .parse::<f64>()
        .map_err(|e| format!("invalid max speed '{max}': {e}"))?;

    Ok(RaceEntry::new(position, average, max))
}
