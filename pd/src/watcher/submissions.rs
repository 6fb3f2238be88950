//! Submission watcher
//!
//! Consumes the live submission feed, classifies new posts by their
//! bracketed title segments, registers threshold-mode posts in the monitor
//! table, and emits playlist-creation tasks.

use std::sync::Arc;

use eyre::Result;
use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::monitor::{MonitorTable, MonitoredSubmission};
use crate::platform::{DiscussionClient, Submission};
use crate::task::{EventRef, Task, WorkQueue};

/// What a submission title asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionCommand {
    /// `[open] [Title]` - collaborative playlist, no monitoring
    Open { title: String },
    /// `[auto=<n>] [Title]` - bot-curated playlist gated on votes
    Threshold { title: String, votes_needed: u32 },
}

/// Classify a submission title.
///
/// Requires at least two bracketed segments: the mode (case-insensitive,
/// whitespace-stripped) and the playlist title. Unknown modes and titles
/// with fewer than two segments are ignored. A malformed `auto=` value
/// falls back to `default_threshold`.
pub fn parse_title(pattern: &Regex, title: &str, default_threshold: u32) -> Option<SubmissionCommand> {
    let segments: Vec<&str> = pattern
        .captures_iter(title)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if segments.len() < 2 {
        return None;
    }

    let mode: String = segments[0]
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let title = segments[1].to_string();

    if mode == "open" {
        return Some(SubmissionCommand::Open { title });
    }

    if let Some(value) = mode.strip_prefix("auto=") {
        let votes_needed = value.parse().unwrap_or(default_threshold);
        return Some(SubmissionCommand::Threshold { title, votes_needed });
    }

    None
}

/// The SubmissionWatcher turns qualifying posts into playlist tasks
pub struct SubmissionWatcher {
    discussion: Arc<dyn DiscussionClient>,
    queue: WorkQueue,
    monitor: MonitorTable,
    config: BotConfig,
    pattern: Regex,
}

impl SubmissionWatcher {
    pub fn new(discussion: Arc<dyn DiscussionClient>, queue: WorkQueue, monitor: MonitorTable, config: BotConfig) -> Self {
        Self {
            discussion,
            queue,
            monitor,
            config,
            pattern: Regex::new(r"\[(.*?)\]").expect("bracket pattern is valid"),
        }
    }

    /// Handle one new submission
    async fn handle_submission(&self, submission: &Submission) -> Result<()> {
        let Some(command) = parse_title(&self.pattern, &submission.title, self.config.default_threshold) else {
            debug!(id = %submission.id, title = %submission.title, "Ignoring submission");
            return Ok(());
        };

        let event = EventRef::Submission {
            id: submission.id.clone(),
        };

        match command {
            SubmissionCommand::Open { title } => {
                info!(id = %submission.id, %title, "Open playlist requested");
                self.queue.enqueue(Task::open_playlist(title), event)?;
            }

            SubmissionCommand::Threshold { title, votes_needed } => {
                info!(id = %submission.id, %title, votes_needed, "Threshold playlist requested");

                // Register monitoring before the task is queued so comment
                // handling can see the entry as soon as work is accepted
                self.monitor
                    .put(&submission.id, MonitoredSubmission::new(votes_needed))
                    .await?;

                self.queue
                    .enqueue(Task::threshold_playlist(title, votes_needed), event)?;
            }
        }

        Ok(())
    }

    /// Run a single poll cycle (useful for testing); returns how many new
    /// submissions were seen.
    pub async fn poll_once(&self) -> Result<usize> {
        let submissions = self.discussion.poll_new_submissions().await?;
        let count = submissions.len();

        for submission in &submissions {
            self.handle_submission(submission).await?;
        }

        Ok(count)
    }

    /// Run the watcher loop until shutdown is signalled.
    ///
    /// Transient stream errors pause the loop for the configured backoff
    /// and then resume from the live position.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Submission watcher started"
        );

        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.discussion.poll_new_submissions() => result,
            };

            let pause = match batch {
                Ok(submissions) => {
                    for submission in &submissions {
                        if let Err(e) = self.handle_submission(submission).await {
                            warn!(id = %submission.id, error = %e, "Failed to handle submission");
                        }
                    }
                    self.config.poll_interval()
                }
                Err(e) if e.is_auth() => {
                    error!(error = %e, "Submission stream lost authentication, stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Submission stream error, backing off");
                    self.config.stream_backoff()
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Submission watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::platform::{Comment, CommentRef, PlatformError};
    use crate::task::{work_queue, Dequeued};

    fn pattern() -> Regex {
        Regex::new(r"\[(.*?)\]").unwrap()
    }

    #[test]
    fn test_parse_title_auto() {
        let cmd = parse_title(&pattern(), "[auto=5] [My Playlist]", 10).unwrap();
        assert_eq!(
            cmd,
            SubmissionCommand::Threshold {
                title: "My Playlist".into(),
                votes_needed: 5
            }
        );
    }

    #[test]
    fn test_parse_title_auto_bad_value_defaults() {
        let cmd = parse_title(&pattern(), "[auto=bad] [X]", 10).unwrap();
        assert_eq!(
            cmd,
            SubmissionCommand::Threshold {
                title: "X".into(),
                votes_needed: 10
            }
        );
    }

    #[test]
    fn test_parse_title_open() {
        let cmd = parse_title(&pattern(), "[open] [X]", 10).unwrap();
        assert_eq!(cmd, SubmissionCommand::Open { title: "X".into() });
    }

    #[test]
    fn test_parse_title_mode_is_case_and_space_insensitive() {
        let cmd = parse_title(&pattern(), "[ Auto = 3 ] [X]", 10).unwrap();
        assert_eq!(
            cmd,
            SubmissionCommand::Threshold {
                title: "X".into(),
                votes_needed: 3
            }
        );

        let cmd = parse_title(&pattern(), "[OPEN] [X]", 10).unwrap();
        assert_eq!(cmd, SubmissionCommand::Open { title: "X".into() });
    }

    #[test]
    fn test_parse_title_rejects_unknown_mode_and_short_titles() {
        assert_eq!(parse_title(&pattern(), "[closed] [X]", 10), None);
        assert_eq!(parse_title(&pattern(), "[open]", 10), None);
        assert_eq!(parse_title(&pattern(), "no brackets at all", 10), None);
    }

    /// Discussion client that serves one scripted submission batch
    struct ScriptedFeed {
        submissions: Mutex<Vec<Submission>>,
    }

    #[async_trait]
    impl DiscussionClient for ScriptedFeed {
        async fn poll_new_submissions(&self) -> Result<Vec<Submission>, PlatformError> {
            Ok(self.submissions.lock().await.drain(..).collect())
        }

        async fn poll_new_comments(&self) -> Result<Vec<Comment>, PlatformError> {
            Ok(Vec::new())
        }

        async fn reply_to_submission(&self, _: &str, _: &str) -> Result<CommentRef, PlatformError> {
            unimplemented!("not used by the submission watcher")
        }

        async fn reply_to_comment(&self, _: &str, _: &str) -> Result<CommentRef, PlatformError> {
            unimplemented!("not used by the submission watcher")
        }

        async fn distinguish_comment(&self, _: &str, _: bool) -> Result<(), PlatformError> {
            unimplemented!("not used by the submission watcher")
        }

        async fn get_comment(&self, _: &str) -> Result<Comment, PlatformError> {
            unimplemented!("not used by the submission watcher")
        }
    }

    fn submission(id: &str, title: &str) -> Submission {
        Submission {
            id: id.into(),
            title: title.into(),
            author: "poster".into(),
        }
    }

    #[tokio::test]
    async fn test_open_submission_emits_task_without_monitoring() {
        let feed = Arc::new(ScriptedFeed {
            submissions: Mutex::new(vec![submission("s1", "[open] [Summer Mix]")]),
        });
        let (queue, mut rx) = work_queue();
        let monitor = MonitorTable::spawn();

        let watcher = SubmissionWatcher::new(feed, queue, monitor.clone(), BotConfig::default());
        watcher.poll_once().await.unwrap();

        match rx.recv().await {
            Dequeued::Entry(env) => {
                assert_eq!(env.task, Task::open_playlist("Summer Mix"));
                assert_eq!(env.event, EventRef::Submission { id: "s1".into() });
            }
            Dequeued::EndOfStream => panic!("expected a task"),
        }

        assert!(!monitor.contains("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_threshold_submission_registers_monitoring_and_emits_task() {
        let feed = Arc::new(ScriptedFeed {
            submissions: Mutex::new(vec![submission("s2", "[auto=5] [Road Trip]")]),
        });
        let (queue, mut rx) = work_queue();
        let monitor = MonitorTable::spawn();

        let watcher = SubmissionWatcher::new(feed, queue, monitor.clone(), BotConfig::default());
        watcher.poll_once().await.unwrap();

        let entry = monitor.get("s2").await.unwrap().unwrap();
        assert_eq!(entry.threshold, 5);
        assert_eq!(entry.playlist_ref, None);

        match rx.recv().await {
            Dequeued::Entry(env) => {
                assert_eq!(env.task, Task::threshold_playlist("Road Trip", 5));
            }
            Dequeued::EndOfStream => panic!("expected a task"),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_submission_is_ignored() {
        let feed = Arc::new(ScriptedFeed {
            submissions: Mutex::new(vec![
                submission("s3", "just a chat post"),
                submission("s4", "[shuffle] [Nope]"),
            ]),
        });
        let (queue, mut rx) = work_queue();
        let monitor = MonitorTable::spawn();

        let watcher = SubmissionWatcher::new(feed, queue.clone(), monitor.clone(), BotConfig::default());
        watcher.poll_once().await.unwrap();

        queue.signal_shutdown().unwrap();
        assert!(matches!(rx.recv().await, Dequeued::EndOfStream));
        assert!(!monitor.contains("s3").await.unwrap());
        assert!(!monitor.contains("s4").await.unwrap());
    }
}
