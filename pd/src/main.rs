//! playlistd - Community-Driven Collaborative Playlist Daemon
//!
//! CLI entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use playlistd::cli::{Cli, Command, OutputFormat};
use playlistd::config::Config;
use playlistd::coordinator::{Daemon, SnapshotStore};
use playlistd::watcher::count_open_records;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("playlistd")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("pd.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        None | Some(Command::Run) => cmd_run(config).await,
        Some(Command::Status { format }) => cmd_status(&config, format).await,
    }
}

/// Run the daemon in the foreground
async fn cmd_run(config: Config) -> Result<()> {
    config.validate()?;

    println!("playlistd watching r/{} (ctrl-c to stop)", config.bot.subreddit);
    Daemon::new(config).run().await
}

/// Show persisted state
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let store = SnapshotStore::new(&config.storage.data_dir);
    let snapshot = store.load().await?;
    let open_votes = count_open_records(&store.votes_file())?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "pending_tasks": snapshot.queue.len(),
                "monitored_submissions": snapshot.monitors.len(),
                "open_vote_records": open_votes,
                "data_dir": config.storage.data_dir,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Data dir:               {}", config.storage.data_dir.display());
            println!("Pending tasks:          {}", snapshot.queue.len());
            println!("Monitored submissions:  {}", snapshot.monitors.len());
            println!("Open vote records:      {}", open_votes);

            for envelope in &snapshot.queue {
                println!("  - {} ({})", envelope.task.kind(), envelope.id);
            }
        }
    }

    Ok(())
}
