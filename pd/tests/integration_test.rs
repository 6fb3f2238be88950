//! Integration tests for playlistd
//!
//! These tests drive the full daemon lifecycle with scripted platform
//! clients: feed in submissions and comments, let the watchers and the
//! executor run, then verify the side effects and the shutdown snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use playlistd::config::Config;
use playlistd::coordinator::{Daemon, SnapshotStore};
use playlistd::platform::{
    Comment, CommentRef, DiscussionClient, MusicClient, Parent, PlatformError, Playlist, Submission, TrackRef,
};

/// Discussion client that serves one submission batch immediately and one
/// comment batch only after the bot has posted a reply (i.e. after the
/// playlist exists), which is when real users would see the instructions.
struct ScriptedDiscussion {
    submissions: Mutex<Vec<Submission>>,
    comments: Mutex<Vec<Comment>>,
    replies: Mutex<Vec<(String, String)>>,
    pins: AtomicUsize,
}

impl ScriptedDiscussion {
    fn new(submissions: Vec<Submission>, comments: Vec<Comment>) -> Self {
        Self {
            submissions: Mutex::new(submissions),
            comments: Mutex::new(comments),
            replies: Mutex::new(Vec::new()),
            pins: AtomicUsize::new(0),
        }
    }

    fn reply_count(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl DiscussionClient for ScriptedDiscussion {
    async fn poll_new_submissions(&self) -> Result<Vec<Submission>, PlatformError> {
        Ok(self.submissions.lock().unwrap().drain(..).collect())
    }

    async fn poll_new_comments(&self) -> Result<Vec<Comment>, PlatformError> {
        if self.reply_count() == 0 {
            return Ok(Vec::new());
        }
        Ok(self.comments.lock().unwrap().drain(..).collect())
    }

    async fn reply_to_submission(&self, submission_id: &str, body: &str) -> Result<CommentRef, PlatformError> {
        self.replies
            .lock()
            .unwrap()
            .push((submission_id.to_string(), body.to_string()));
        Ok(CommentRef { id: "bot-reply".into() })
    }

    async fn reply_to_comment(&self, comment_id: &str, body: &str) -> Result<CommentRef, PlatformError> {
        self.replies
            .lock()
            .unwrap()
            .push((comment_id.to_string(), body.to_string()));
        Ok(CommentRef { id: "bot-reply".into() })
    }

    async fn distinguish_comment(&self, _: &str, _: bool) -> Result<(), PlatformError> {
        self.pins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_comment(&self, comment_id: &str) -> Result<Comment, PlatformError> {
        // Candidate comments are resolved from the already-served batch
        if comment_id == "c-add" {
            return Ok(candidate_comment());
        }
        Err(PlatformError::NotFound(comment_id.into()))
    }
}

/// Music client recording every call
#[derive(Default)]
struct RecordingMusic {
    creates: Mutex<Vec<String>>,
    added: Mutex<Vec<String>>,
}

#[async_trait]
impl MusicClient for RecordingMusic {
    async fn search_track(&self, artist: &str, title: &str) -> Result<Option<TrackRef>, PlatformError> {
        Ok(Some(TrackRef {
            uri: format!("uri:{}:{}", artist, title),
            name: title.into(),
            artist: artist.into(),
        }))
    }

    async fn create_playlist(&self, name: &str, _public: bool) -> Result<Playlist, PlatformError> {
        self.creates.lock().unwrap().push(name.to_string());
        Ok(Playlist {
            id: "p1".into(),
            name: name.into(),
            url: "https://example/p1".into(),
        })
    }

    async fn set_playlist_collaborative(&self, _: &str, _: bool) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn add_track(&self, _: &str, track_uri: &str) -> Result<(), PlatformError> {
        self.added.lock().unwrap().push(track_uri.to_string());
        Ok(())
    }
}

/// Music client that refuses every request with a transient error
struct DownMusic;

#[async_trait]
impl MusicClient for DownMusic {
    async fn search_track(&self, _: &str, _: &str) -> Result<Option<TrackRef>, PlatformError> {
        Err(PlatformError::Transient("down".into()))
    }

    async fn create_playlist(&self, _: &str, _: bool) -> Result<Playlist, PlatformError> {
        Err(PlatformError::Transient("down".into()))
    }

    async fn set_playlist_collaborative(&self, _: &str, _: bool) -> Result<(), PlatformError> {
        Err(PlatformError::Transient("down".into()))
    }

    async fn add_track(&self, _: &str, _: &str) -> Result<(), PlatformError> {
        Err(PlatformError::Transient("down".into()))
    }
}

fn test_config(data_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.bot.poll_interval_secs = 0;
    config.executor.retry_backoff_secs = 0;
    config
}

fn candidate_comment() -> Comment {
    Comment {
        id: "c-add".into(),
        body: "!add Hey Jude by The Beatles".into(),
        author_id: "t2_suggester".into(),
        submission_id: "s1".into(),
        parent: Parent::Submission("s1".into()),
    }
}

fn vote_comment(id: &str, voter: &str) -> Comment {
    Comment {
        id: id.into(),
        body: "!vote".into(),
        author_id: voter.into(),
        submission_id: "s1".into(),
        parent: Parent::Comment("c-add".into()),
    }
}

// =============================================================================
// End-to-end vote flow
// =============================================================================

#[tokio::test]
async fn test_threshold_flow_end_to_end() {
    let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config = test_config(temp.path());

    let discussion = Arc::new(ScriptedDiscussion::new(
        vec![Submission {
            id: "s1".into(),
            title: "[auto=2] [Road Trip]".into(),
            author: "poster".into(),
        }],
        vec![
            candidate_comment(),
            vote_comment("v1", "t2_voter_a"),
            // Repeat vote from the same account must not count
            vote_comment("v2", "t2_voter_a"),
            vote_comment("v3", "t2_voter_b"),
        ],
    ));
    let music = Arc::new(RecordingMusic::default());

    let daemon = Daemon::new(config.clone());
    daemon
        .run_until(
            discussion.clone(),
            music.clone(),
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await
        .expect("daemon run failed");

    // The playlist was created and announced with a pinned reply
    assert_eq!(*music.creates.lock().unwrap(), vec!["Road Trip".to_string()]);
    assert!(discussion.reply_count() >= 1);
    assert!(discussion.pins.load(Ordering::SeqCst) >= 1);

    // Two distinct voters promoted the suggestion into a track addition
    assert_eq!(*music.added.lock().unwrap(), vec!["uri:The Beatles:Hey Jude".to_string()]);

    // Everything completed, so the shutdown snapshot holds no pending work
    let snapshot = SnapshotStore::new(&config.storage.data_dir).load().await.unwrap();
    assert!(snapshot.queue.is_empty());
    assert_eq!(snapshot.monitors.get("s1").unwrap().threshold, 2);
    assert_eq!(
        snapshot.monitors.get("s1").unwrap().playlist_ref.as_deref(),
        Some("https://example/p1")
    );
}

// =============================================================================
// Snapshot restart recovery
// =============================================================================

#[tokio::test]
async fn test_pending_work_resumes_after_restart() {
    let temp = tempfile::TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(temp.path());
    // Long backoff keeps the failed task parked in its retry
    config.executor.retry_backoff_secs = 60;

    // First run: the music platform is down, so the accepted task never
    // completes and must land in the snapshot
    let discussion = Arc::new(ScriptedDiscussion::new(
        vec![Submission {
            id: "s9".into(),
            title: "[open] [Summer Mix]".into(),
            author: "poster".into(),
        }],
        Vec::new(),
    ));

    let daemon = Daemon::new(config.clone());
    daemon
        .run_until(discussion, Arc::new(DownMusic), tokio::time::sleep(Duration::from_millis(300)))
        .await
        .expect("first run failed");

    let snapshot = SnapshotStore::new(&config.storage.data_dir).load().await.unwrap();
    assert_eq!(snapshot.queue.len(), 1);
    assert_eq!(snapshot.queue[0].task.kind(), "open-playlist");

    // Second run: the platform is back; the restored task executes without
    // any new feed activity
    config.executor.retry_backoff_secs = 0;
    let discussion = Arc::new(ScriptedDiscussion::new(Vec::new(), Vec::new()));
    let music = Arc::new(RecordingMusic::default());

    let daemon = Daemon::new(config.clone());
    daemon
        .run_until(
            discussion.clone(),
            music.clone(),
            tokio::time::sleep(Duration::from_millis(300)),
        )
        .await
        .expect("second run failed");

    assert_eq!(*music.creates.lock().unwrap(), vec!["Summer Mix".to_string()]);
    assert!(discussion.reply_count() >= 1);

    let snapshot = SnapshotStore::new(&config.storage.data_dir).load().await.unwrap();
    assert!(snapshot.queue.is_empty());
}
