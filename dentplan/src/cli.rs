//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DentPlan - conversational treatment plan assistant
#[derive(Parser)]
#[command(
    name = "dentplan",
    about = "Conversational assembly and validation of dental treatment plans",
    version,
    after_help = "Logs are written to: ~/.local/share/dentplan/logs/dentplan.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the interactive console session (default)
    Chat {
        /// Session id, defaults to "console"
        #[arg(short, long, default_value = "console")]
        session: String,
    },

    /// Price a batch of service codes one-shot
    Price {
        /// Service codes
        #[arg(value_name = "CODE", required = true)]
        codes: Vec<String>,
    },

    /// Semantic search over the price list one-shot
    Search {
        /// Free-text query
        #[arg(value_name = "QUERY", required = true)]
        query: Vec<String>,
    },
}
