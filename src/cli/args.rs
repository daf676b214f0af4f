//! Command-line argument parsing for deskpilot
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// deskpilot - turn spoken or typed commands into desktop actions
#[derive(Parser, Debug)]
#[command(name = "deskpilot")]
#[command(version)]
#[command(about = "Interpret natural-language commands and dispatch desktop actions", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.deskpilot/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Read utterances from a file, one per line, instead of stdin
    #[arg(short, long)]
    pub script: Option<PathBuf>,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Never consult the generative classifier
    #[arg(long)]
    pub no_classifier: bool,

    /// Keep learned tasks in memory only
    #[arg(long)]
    pub no_persist: bool,

    /// Print every request outcome, not only the summary
    #[arg(long)]
    pub detailed: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Read and dispatch utterances until input ends (default)
    Run,

    /// Show how an utterance would be resolved, without dispatching
    Interpret {
        /// The utterance
        #[arg(required = true, num_args = 1..)]
        utterance: Vec<String>,
    },

    /// List learned tasks with usage statistics
    Tasks,

    /// Delete a learned task
    Forget {
        /// Task name (case-insensitive)
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Subcommand, defaulting to `run`
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

impl Verbosity {
    /// Default tracing filter directive
    pub fn filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }
}
