//! Daemon lifecycle coordination
//!
//! Wires the watchers, executor, monitor table and work queue together,
//! restores the previous snapshot at startup, and converts the first
//! interrupt into an orderly stop / drain / snapshot sequence.

use std::future::Future;
use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::executor::TaskExecutor;
use crate::monitor::MonitorTable;
use crate::platform::{DiscussionClient, MusicClient, RedditClient, SpotifyClient};
use crate::task::work_queue;
use crate::watcher::{CommentWatcher, SubmissionWatcher, VoteLedger};

use super::persistence::{Snapshot, SnapshotStore};

/// The coordinator supervising the whole daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connect both platform clients and run until interrupted.
    ///
    /// Music platform authentication is the one fatal startup step: nothing
    /// else is spawned if it fails, and the process exits non-zero.
    pub async fn run(self) -> Result<()> {
        info!("Authenticating with the music platform");
        let music = SpotifyClient::connect(&self.config.spotify)
            .await
            .map_err(|e| eyre::eyre!("Music platform authentication failed: {}", e))?;

        info!("Connecting to the discussion platform");
        let discussion = RedditClient::connect(&self.config.reddit, &self.config.bot.subreddit)
            .await
            .map_err(|e| eyre::eyre!("Discussion platform connection failed: {}", e))?;

        self.run_until(Arc::new(discussion), Arc::new(music), wait_for_interrupt())
            .await
    }

    /// Run the full pipeline with the given clients until `signal` resolves.
    ///
    /// Split from [`Daemon::run`] so tests can drive the lifecycle with
    /// scripted clients and a synthetic termination signal.
    pub async fn run_until(
        &self,
        discussion: Arc<dyn DiscussionClient>,
        music: Arc<dyn MusicClient>,
        signal: impl Future<Output = ()>,
    ) -> Result<()> {
        let store = SnapshotStore::new(&self.config.storage.data_dir);

        // Restore state accepted before the last shutdown. The files on
        // disk stay untouched until a new snapshot replaces them, so a
        // crash from here on loses nothing.
        let snapshot = store.load().await?;
        let monitor = MonitorTable::with_entries(snapshot.monitors);

        let (queue, receiver) = work_queue();
        for envelope in snapshot.queue {
            queue.enqueue_envelope(envelope).context("Failed to re-enqueue saved task")?;
        }

        let ledger = VoteLedger::open(store.votes_file())?;

        let (shutdown_tx, _) = watch::channel(false);

        let executor = TaskExecutor::new(
            discussion.clone(),
            music.clone(),
            monitor.clone(),
            receiver,
            self.config.executor.clone(),
        );
        let executor_handle = tokio::spawn(executor.run(shutdown_tx.subscribe()));

        let submission_watcher =
            SubmissionWatcher::new(discussion.clone(), queue.clone(), monitor.clone(), self.config.bot.clone());
        let submission_handle = tokio::spawn(submission_watcher.run(shutdown_tx.subscribe()));

        let comment_watcher = CommentWatcher::new(
            discussion.clone(),
            queue.clone(),
            monitor.clone(),
            ledger,
            self.config.bot.clone(),
        );
        let comment_handle = tokio::spawn(comment_watcher.run(shutdown_tx.subscribe()));

        info!(community = %self.config.bot.subreddit, "playlistd running");
        signal.await;
        info!("Termination requested, beginning shutdown");

        // Stop the watchers first so nothing lands behind the sentinel.
        // Hard interruption is acceptable: their durable state is the
        // monitor table and the continuously-synced vote ledger.
        let _ = shutdown_tx.send(true);
        submission_handle.abort();
        comment_handle.abort();
        let _ = submission_handle.await;
        let _ = comment_handle.await;

        // Let the executor abandon any in-place retry and hand back the queue
        if queue.signal_shutdown().is_err() {
            warn!("Work queue already closed at shutdown");
        }
        let outcome = executor_handle.await.context("Executor task panicked")?;

        // The abandoned task goes back to the head so it is retried first
        // after restart
        let mut receiver = outcome.receiver;
        let mut pending = Vec::new();
        if let Some(envelope) = outcome.in_flight {
            pending.push(envelope);
        }
        pending.extend(receiver.drain());

        let monitors = monitor.export().await.map_err(|e| eyre::eyre!("{}", e))?;
        store.save(&Snapshot { queue: pending, monitors }).await?;

        let _ = monitor.shutdown().await;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Wait for the first interrupt. Later interrupts stay captured by the
/// installed handler while the shutdown sequence runs, instead of killing
/// the process mid-write.
async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
}
