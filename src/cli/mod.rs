//! Command-line front end for the knowledge base.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;
use crate::services::config_store::DEFAULT_CONFIG_PATH;

/// Cost-aware knowledge base search with LLM fallback signalling.
#[derive(Debug, Parser)]
#[command(name = "kbsearch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "KBSEARCH_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Configuration file (.toml, .json, .yaml)"
    )]
    pub config: PathBuf,

    #[arg(
        long,
        short = 'u',
        global = true,
        help = "User id for event logs (defaults to system.defaultUserId)"
    )]
    pub user: Option<String>,

    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search the knowledge base
    Search(commands::SearchArgs),

    /// Estimate the cost of a search without running it
    Estimate(commands::EstimateArgs),

    /// Inspect or change configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),

    /// Import documents from a JSON array or JSONL file
    Import(commands::ImportArgs),

    /// Manage the vector collection
    #[command(subcommand)]
    Index(commands::IndexCommand),

    /// Read or rotate per-user event logs
    #[command(subcommand)]
    Logs(commands::LogsCommand),

    /// Serve tool calls as newline-delimited JSON on stdin/stdout
    Serve,
}
