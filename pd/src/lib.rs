//! playlistd - Community-Driven Collaborative Playlist Daemon
//!
//! playlistd watches a community discussion feed for posts and comments
//! that request collaborative playlist actions on a music-streaming
//! platform and executes them through a durable, resumable task pipeline.
//!
//! # Core Concepts
//!
//! - **One Queue, One Consumer**: both watchers produce onto a single FIFO
//!   work queue drained by one serial executor
//! - **Remote Before Local**: a reply is only ever posted after the
//!   playlist action it announces has succeeded
//! - **Retry Until Told to Stop**: failures are assumed transient; tasks
//!   retry in place instead of advancing the queue
//! - **Nothing Accepted Is Lost**: queued work and monitoring state are
//!   snapshotted at shutdown and restored at startup
//!
//! # Modules
//!
//! - [`platform`] - client traits and the Reddit/Spotify implementations
//! - [`task`] - task variants and the work queue
//! - [`monitor`] - shared monitor table actor
//! - [`watcher`] - submission and comment watchers, vote ledger
//! - [`executor`] - serial task executor
//! - [`coordinator`] - lifecycle orchestration and snapshot persistence
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod monitor;
pub mod platform;
pub mod task;
pub mod watcher;

// Re-export commonly used types
pub use config::{BotConfig, Config, ExecutorConfig, RedditConfig, SpotifyConfig, StorageConfig};
pub use coordinator::{Daemon, Snapshot, SnapshotStore};
pub use executor::{ExecutorOutcome, ExecutorState, TaskExecutor};
pub use monitor::{MonitorError, MonitorTable, MonitoredSubmission};
pub use platform::{
    Comment, CommentRef, DiscussionClient, MusicClient, Parent, PlatformError, Playlist, RedditClient, SpotifyClient,
    Submission, TrackRef,
};
pub use task::{work_queue, Dequeued, EventRef, Task, TaskEnvelope, TaskError, WorkQueue, WorkQueueReceiver};
pub use watcher::{parse_add_command, parse_title, CommentWatcher, SubmissionCommand, SubmissionWatcher, VoteLedger};
