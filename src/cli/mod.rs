//! CLI module for sleuth
//!
//! Provides command-line interface parsing for the sleuth binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// sleuth - multi-agent deep research
///
/// Plans a query, investigates the sub-topics in parallel, synthesizes one
/// report and cites every claim.
#[derive(Parser, Debug)]
#[command(
    name = "sleuth",
    author = "Dirmacs <build@dirmacs.com>",
    version,
    about = "sleuth - multi-agent deep research with cited reports",
    after_help = "EXAMPLES:\n    \
                  sleuth init                              # Scaffold sleuth.toml\n    \
                  sleuth research \"How did async Rust evolve?\"\n    \
                  sleuth research --sse \"...\"              # Raw server-sent events\n    \
                  sleuth config --validate                 # Check the configuration"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sleuth.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one research query and print the cited report
    Research {
        /// The research question
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Print the event stream as server-sent-event frames
        #[arg(long)]
        sse: bool,

        /// Render citation markers as markdown links
        #[arg(long)]
        links: bool,
    },

    /// Create sleuth.toml and .env.example
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files without prompting
        #[arg(short, long)]
        force: bool,

        /// LLM provider to configure (ollama, openai, or both)
        #[arg(long, default_value = "ollama", value_parser = ["ollama", "openai", "both"])]
        provider: String,
    },

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
