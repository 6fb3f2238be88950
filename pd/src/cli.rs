//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// playlistd - community-driven collaborative playlist daemon
#[derive(Parser)]
#[command(
    name = "pd",
    about = "Watches a community feed and maintains collaborative playlists",
    version,
    after_help = "Logs are written to: ~/.local/share/playlistd/logs/pd.log"
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
    /// Run the daemon in the foreground (default)
    Run,

    /// Show persisted state: pending tasks, monitored posts, open votes
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Output format for the status command
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}
