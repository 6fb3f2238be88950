//! Task variants and their remote/local effects
//!
//! A task is one unit of accepted work: a state-changing effect on the music
//! platform followed by a visible effect on the discussion platform. Both
//! effects must tolerate being called again after a partial failure; the
//! `playlist` result slots make the remote effects skip work they have
//! already done, and the slots are serialized with the task so that holds
//! across a snapshot/restore cycle too.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::monitor::{MonitorError, MonitorTable};
use crate::platform::{DiscussionClient, MusicClient, Playlist, PlatformError};

/// Errors that can occur while applying task effects
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl TaskError {
    /// Fatal errors are skipped by the executor instead of retried;
    /// retrying cannot fix a logic error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskError::Invariant(_) | TaskError::Monitor(MonitorError::NotFound(_))
        )
    }
}

/// Serializable reference to the event a task originated from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventRef {
    Submission { id: String },
    Comment { id: String },
}

impl EventRef {
    fn submission_id(&self) -> Result<&str, TaskError> {
        match self {
            EventRef::Submission { id } => Ok(id),
            EventRef::Comment { .. } => Err(TaskError::Invariant(
                "playlist task originated from a comment event".into(),
            )),
        }
    }
}

/// A unit of work queued for serial execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Create a playlist anyone may edit and announce it on the submission
    OpenPlaylist {
        title: String,
        /// Result slot filled by the remote effect
        playlist: Option<Playlist>,
    },

    /// Create a bot-curated playlist fed by vote-approved suggestions
    ThresholdPlaylist {
        title: String,
        votes_needed: u32,
        /// Result slot filled by the remote effect
        playlist: Option<Playlist>,
    },

    /// Add an approved suggestion to an existing playlist
    AddTrack {
        playlist_ref: String,
        artist: String,
        song: String,
    },
}

impl Task {
    pub fn open_playlist(title: impl Into<String>) -> Self {
        Task::OpenPlaylist {
            title: title.into(),
            playlist: None,
        }
    }

    pub fn threshold_playlist(title: impl Into<String>, votes_needed: u32) -> Self {
        Task::ThresholdPlaylist {
            title: title.into(),
            votes_needed,
            playlist: None,
        }
    }

    pub fn add_track(playlist_ref: impl Into<String>, artist: impl Into<String>, song: impl Into<String>) -> Self {
        Task::AddTrack {
            playlist_ref: playlist_ref.into(),
            artist: artist.into(),
            song: song.into(),
        }
    }

    /// Short variant name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Task::OpenPlaylist { .. } => "open-playlist",
            Task::ThresholdPlaylist { .. } => "threshold-playlist",
            Task::AddTrack { .. } => "add-track",
        }
    }

    /// Apply the music-platform effect. Safe to call again after a failure:
    /// playlist creation is skipped once the result slot is filled.
    pub async fn apply_remote(&mut self, music: &dyn MusicClient) -> Result<(), TaskError> {
        match self {
            Task::OpenPlaylist { title, playlist } => {
                if playlist.is_none() {
                    *playlist = Some(music.create_playlist(title, true).await?);
                    debug!(%title, "Created playlist");
                }

                if let Some(created) = playlist {
                    music.set_playlist_collaborative(&created.id, true).await?;
                    debug!(%title, "Made playlist open to contribute to");
                }
                Ok(())
            }

            Task::ThresholdPlaylist { title, playlist, .. } => {
                if playlist.is_none() {
                    *playlist = Some(music.create_playlist(title, true).await?);
                    debug!(%title, "Created playlist");
                }
                Ok(())
            }

            Task::AddTrack {
                playlist_ref,
                artist,
                song,
            } => {
                debug!(%artist, %song, "Searching for track");
                match music.search_track(artist, song).await? {
                    Some(track) => {
                        music.add_track(playlist_ref, &track.uri).await?;
                        debug!(uri = %track.uri, "Added track to playlist");
                    }
                    None => {
                        // Zero results completes the task; there is nothing to retry
                        warn!(%artist, %song, "Could not find track, skipping");
                    }
                }
                Ok(())
            }
        }
    }

    /// Apply the discussion-platform effect. Only called after the remote
    /// effect reported success, so a reply is never posted for a playlist
    /// action that did not happen.
    pub async fn apply_local(
        &self,
        discussion: &dyn DiscussionClient,
        monitor: &MonitorTable,
        event: &EventRef,
    ) -> Result<(), TaskError> {
        match self {
            Task::OpenPlaylist { title, playlist } => {
                let playlist = require_playlist(playlist)?;
                let submission_id = event.submission_id()?;

                let body = format!("{} is a collaborative playlist called {}\n", playlist.url, title);
                let reply = discussion.reply_to_submission(submission_id, &body).await?;
                debug!(%submission_id, "Posted playlist announcement");

                discussion.distinguish_comment(&reply.id, true).await?;
                debug!(comment_id = %reply.id, "Pinned announcement");
                Ok(())
            }

            Task::ThresholdPlaylist {
                title,
                votes_needed,
                playlist,
            } => {
                let playlist = require_playlist(playlist)?;
                let submission_id = event.submission_id()?;

                // Publish the reference before announcing it, so suggestion
                // handling can resolve the playlist as soon as the reply is up
                monitor.set_playlist_ref(submission_id, &playlist.url).await?;

                let body = format!(
                    "{} is a playlist called {}  \n\
                     To make a submission comment  \n\
                     \"!add <song name> by <artist>\"  \n\
                     To vote on a submission comment \"!vote\"  \n\
                     This submission requires {} votes to add a song to the playlist",
                    playlist.url, title, votes_needed
                );
                let reply = discussion.reply_to_submission(submission_id, &body).await?;
                debug!(%submission_id, "Posted playlist announcement");

                discussion.distinguish_comment(&reply.id, true).await?;
                debug!(comment_id = %reply.id, "Pinned announcement");
                Ok(())
            }

            Task::AddTrack { .. } => Ok(()),
        }
    }
}

fn require_playlist(playlist: &Option<Playlist>) -> Result<&Playlist, TaskError> {
    playlist
        .as_ref()
        .ok_or_else(|| TaskError::Invariant("local effect reached with no playlist result".into()))
}
