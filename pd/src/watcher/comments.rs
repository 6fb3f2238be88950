//! Comment watcher
//!
//! Consumes the live comment feed and drives the suggestion/vote state
//! machine: `!add` comments become candidates (or are auto-approved on
//! threshold-1 submissions), `!vote` replies accumulate voter identities
//! until the submission's threshold promotes the candidate into an
//! AddTrack task.

use std::sync::Arc;

use eyre::Result;
use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::monitor::MonitorTable;
use crate::platform::{Comment, DiscussionClient, Parent};
use crate::task::{EventRef, Task, WorkQueue};

use super::votes::VoteLedger;

/// Reply posted when an `!add` does not match the grammar or parent rules
const USAGE_REPLY: &str = "To add a song suggestion please make sure you comment on the post itself and \
                           follows the following format:  \n\
                           !add <song name> by <artist>";

/// Split an `!add` body into song title and artist.
///
/// The body is split on the literal token `by`: the song title is the text
/// before the first `by` with the `!add` command stripped, the artist is
/// the text after the last `by`. Multi-word titles and artists survive;
/// anything between two `by` tokens is discarded.
pub fn parse_add_command(body: &str) -> Option<(String, String)> {
    let rest = body.trim().strip_prefix("!add")?.trim_start();

    let parts: Vec<&str> = rest.split(" by ").collect();
    if parts.len() < 2 {
        return None;
    }

    let song = parts[0].trim();
    let artist = parts[parts.len() - 1].trim();
    if song.is_empty() || artist.is_empty() {
        return None;
    }

    Some((song.to_string(), artist.to_string()))
}

/// The CommentWatcher maintains vote records and emits AddTrack tasks
pub struct CommentWatcher {
    discussion: Arc<dyn DiscussionClient>,
    queue: WorkQueue,
    monitor: MonitorTable,
    ledger: VoteLedger,
    config: BotConfig,
    add_pattern: Regex,
}

impl CommentWatcher {
    pub fn new(
        discussion: Arc<dyn DiscussionClient>,
        queue: WorkQueue,
        monitor: MonitorTable,
        ledger: VoteLedger,
        config: BotConfig,
    ) -> Self {
        Self {
            discussion,
            queue,
            monitor,
            ledger,
            config,
            add_pattern: Regex::new(r"^!add\s+(.+)\s+by\s+(.+)$").expect("add pattern is valid"),
        }
    }

    /// Handle one new comment
    pub async fn handle_comment(&mut self, comment: &Comment) -> Result<()> {
        let body = comment.body.trim();

        if body.starts_with("!add") {
            self.handle_add(comment, body).await
        } else if body.eq_ignore_ascii_case("!vote") {
            self.handle_vote(comment).await
        } else {
            Ok(())
        }
    }

    async fn handle_add(&mut self, comment: &Comment, body: &str) -> Result<()> {
        let entry = self
            .monitor
            .get(&comment.submission_id)
            .await?
            .filter(|_| self.add_pattern.is_match(body) && comment.is_top_level());

        let Some(entry) = entry else {
            debug!(id = %comment.id, "Rejecting malformed or misplaced suggestion");
            self.discussion.reply_to_comment(&comment.id, USAGE_REPLY).await?;
            return Ok(());
        };

        if entry.threshold <= 1 {
            // No voting required; the suggestion is approved outright
            self.approve(&comment.submission_id, &comment.id, body).await
        } else {
            self.ledger.insert_candidate(&comment.id)?;
            Ok(())
        }
    }

    async fn handle_vote(&mut self, comment: &Comment) -> Result<()> {
        // Only replies to an open candidate count; anything else is a
        // silent no-op, not a user error
        let Parent::Comment(candidate_id) = &comment.parent else {
            return Ok(());
        };
        if !self.ledger.is_candidate(candidate_id) {
            return Ok(());
        }

        let Some(tally) = self.ledger.add_vote(candidate_id, &comment.author_id)? else {
            return Ok(());
        };

        let Some(entry) = self.monitor.get(&comment.submission_id).await? else {
            warn!(id = %comment.submission_id, "Vote on unmonitored submission, ignoring");
            return Ok(());
        };

        debug!(%candidate_id, tally, threshold = entry.threshold, "Vote recorded");

        if tally as u32 >= entry.threshold {
            // Delete before emitting so the candidate promotes exactly once
            self.ledger.remove(candidate_id)?;
            info!(%candidate_id, "Suggestion reached its vote threshold");

            let candidate = self.discussion.get_comment(candidate_id).await?;
            self.approve(&comment.submission_id, &candidate.id, candidate.body.trim())
                .await?;
        }

        Ok(())
    }

    /// Approve a suggestion: wait for the submission's playlist to exist,
    /// parse the suggestion body, and queue the track addition.
    async fn approve(&self, submission_id: &str, comment_id: &str, body: &str) -> Result<()> {
        let playlist_ref = self.monitor.wait_playlist_ref(submission_id).await?;

        let Some((song, artist)) = parse_add_command(body) else {
            warn!(id = %comment_id, "Approved suggestion no longer parses");
            self.discussion.reply_to_comment(comment_id, USAGE_REPLY).await?;
            return Ok(());
        };

        info!(%song, %artist, %playlist_ref, "Queueing track addition");
        self.queue.enqueue(
            Task::add_track(playlist_ref, artist, song),
            EventRef::Comment {
                id: comment_id.to_string(),
            },
        )?;
        Ok(())
    }

    /// Run a single poll cycle (useful for testing); returns how many new
    /// comments were seen.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let comments = self.discussion.poll_new_comments().await?;
        let count = comments.len();

        for comment in &comments {
            self.handle_comment(comment).await?;
        }

        Ok(count)
    }

    /// Run the watcher loop until shutdown is signalled.
    ///
    /// Transient stream errors pause the loop for the configured backoff
    /// and then resume from the live position.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Comment watcher started"
        );

        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.discussion.poll_new_comments() => result,
            };

            let pause = match batch {
                Ok(comments) => {
                    for comment in &comments {
                        if let Err(e) = self.handle_comment(comment).await {
                            warn!(id = %comment.id, error = %e, "Failed to handle comment");
                        }
                    }
                    self.config.poll_interval()
                }
                Err(e) if e.is_auth() => {
                    error!(error = %e, "Comment stream lost authentication, stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Comment stream error, backing off");
                    self.config.stream_backoff()
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("Comment watcher stopped");
    }
}
