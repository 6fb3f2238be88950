//! Shared types for the platform clients

use serde::{Deserialize, Serialize};

/// A submission (post) on the discussion platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Platform identifier, e.g. "abc123"
    pub id: String,
    /// Post title as written by the author
    pub title: String,
    /// Author account name
    pub author: String,
}

/// What a comment was posted in reply to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parent {
    /// Direct reply to the submission itself
    Submission(String),
    /// Reply to another comment
    Comment(String),
}

/// A comment on the discussion platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    /// Comment body text
    pub body: String,
    /// Stable identity of the comment author (not the display name)
    pub author_id: String,
    /// Submission this comment ultimately belongs to
    pub submission_id: String,
    pub parent: Parent,
}

impl Comment {
    /// Whether this comment replies to the submission directly
    pub fn is_top_level(&self) -> bool {
        matches!(self.parent, Parent::Submission(_))
    }
}

/// Reference to a comment the bot itself posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRef {
    pub id: String,
}

/// A track found on the music platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    /// Platform URI suitable for playlist insertion
    pub uri: String,
    pub name: String,
    pub artist: String,
}

/// A playlist on the music platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    /// Shareable web URL
    pub url: String,
}
