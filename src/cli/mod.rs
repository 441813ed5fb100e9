//! CLI command definitions and handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;

pub mod cache;
pub mod chapters;
pub mod chat;
pub mod init;
pub mod status;

/// Output format options
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Table format - one row per entry (global default)
    #[default]
    Table,
    /// JSON format - structured for scripts
    Json,
}

/// chalktalk - Guided conversations on the history of mathematics, told by
/// an Einstein persona at his blackboard
#[derive(Parser, Debug)]
#[command(name = "chalktalk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(
        long,
        global = true,
        env = "CHALKTALK_FORMAT",
        default_value = "table",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "CHALKTALK_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "CHALKTALK_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize chalktalk configuration
    Init,

    /// Show configuration and cache status
    Status,

    /// Start an interactive discussion
    Chat {
        /// Open this chapter immediately instead of prompting
        #[arg(long, short = 'c')]
        chapter: Option<String>,

        /// Narrate responses aloud
        #[arg(long, short = 'n')]
        narrate: bool,
    },

    /// List the available discussion chapters
    Chapters,

    /// Manage the local artifact cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Display version information
    Version,
}

/// Cache management subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache statistics
    Status,
    /// Remove all cached artifacts
    Clear,
    /// Print cache directory path
    Path,
}

/// Load the configuration, honoring an explicit --config path
pub(crate) fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from(PathBuf::from(p)),
        None => Config::load(),
    }
}
