//! Platform clients for playlistd
//!
//! The daemon talks to two external platforms: the discussion feed it
//! watches for requests, and the music service it manipulates playlists on.
//! Both are reached exclusively through the capability traits in
//! [`client`]; the concrete HTTP implementations live alongside them.

mod client;
mod error;
mod reddit;
mod spotify;
mod types;

pub use client::{DiscussionClient, MusicClient};
pub use error::PlatformError;
pub use reddit::RedditClient;
pub use spotify::SpotifyClient;
pub use types::{Comment, CommentRef, Parent, Playlist, Submission, TrackRef};
