//! Command-line interface for pilotlog.
//!
//! This module provides the CLI structure for the `pilotlog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    parse_entry, CheckCommand, ConfigCommand, InitCommand, ListCommand, RaceCommand,
    ResetCommand, ShowCommand, StatCommand,
};

/// pilotlog - Keep race results and running averages for a roster of pilots
///
/// Every pilot has a ledger file with one row per race; a master index holds
/// each pilot's average position and average speed.
#[derive(Debug, Parser)]
#[command(name = "pilotlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Seed an empty store with generated pilots and races
    Init(InitCommand),

    /// List registered pilots with their averages
    List(ListCommand),

    /// Show race histories of one or more pilots
    Show(ShowCommand),

    /// Print one statistic per race for one or more pilots
    Stat(StatCommand),

    /// Record a new race for every pilot
    Race(RaceCommand),

    /// Compare the index with every pilot ledger
    Check(CheckCommand),

    /// Delete every ledger and start over
    Reset(ResetCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
