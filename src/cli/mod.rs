//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, PatchCommand, PlanCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Provision a research VM from a YAML step list
#[derive(Debug, Parser, Clone)]
#[command(name = "provision")]
#[command(version = "0.1.0")]
#[command(about = "Idempotent, ordered VM provisioning", long_about = None)]
pub struct Cli {
    /// Subcommand to run (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a provisioning configuration
    Run(RunCommand),

    /// Validate a provisioning configuration
    Validate(ValidateCommand),

    /// Show which steps would run or be skipped
    Plan(PlanCommand),

    /// Rewrite a validation script so it runs from the parent directory
    Patch(PatchCommand),

    /// Show run history
    History(HistoryCommand),

    /// List configurations that have run history
    List(ListCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// The command to execute, falling back to a default `run`
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunCommand::default()))
    }
}
