//! Client capability traits for the two platforms
//!
//! The rest of the daemon only ever sees these traits; the concrete HTTP
//! clients live in [`crate::platform::reddit`] and [`crate::platform::spotify`].

use async_trait::async_trait;

use super::error::PlatformError;
use super::types::{Comment, CommentRef, Playlist, Submission, TrackRef};

/// Capability surface required from the discussion platform.
///
/// The polling methods skip pre-existing history: implementations seed an
/// internal cursor on first call and only return items newer than it, so a
/// freshly started watcher never replays the backlog.
#[async_trait]
pub trait DiscussionClient: Send + Sync {
    /// Fetch submissions posted since the last poll, oldest first.
    async fn poll_new_submissions(&self) -> Result<Vec<Submission>, PlatformError>;

    /// Fetch comments posted since the last poll, oldest first.
    async fn poll_new_comments(&self) -> Result<Vec<Comment>, PlatformError>;

    /// Post a top-level reply on a submission.
    async fn reply_to_submission(&self, submission_id: &str, body: &str) -> Result<CommentRef, PlatformError>;

    /// Post a reply to an existing comment.
    async fn reply_to_comment(&self, comment_id: &str, body: &str) -> Result<CommentRef, PlatformError>;

    /// Distinguish one of our own comments and optionally pin it.
    async fn distinguish_comment(&self, comment_id: &str, sticky: bool) -> Result<(), PlatformError>;

    /// Resolve a comment by identifier.
    async fn get_comment(&self, comment_id: &str) -> Result<Comment, PlatformError>;
}

/// Capability surface required from the music platform.
///
/// Authentication happens once when the concrete client is constructed;
/// a failure there is fatal and aborts startup.
#[async_trait]
pub trait MusicClient: Send + Sync {
    /// Search for a track by artist and title. `None` means no results,
    /// which callers treat as a warned no-op rather than an error.
    async fn search_track(&self, artist: &str, title: &str) -> Result<Option<TrackRef>, PlatformError>;

    /// Create a playlist for the bot user.
    async fn create_playlist(&self, name: &str, public: bool) -> Result<Playlist, PlatformError>;

    /// Flip the collaborative flag on a playlist.
    async fn set_playlist_collaborative(&self, playlist_id: &str, collaborative: bool) -> Result<(), PlatformError>;

    /// Append a track URI to a playlist.
    async fn add_track(&self, playlist_id: &str, track_uri: &str) -> Result<(), PlatformError>;
}
