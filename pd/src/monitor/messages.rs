//! Command and error types for the monitor table actor

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::oneshot;

use super::table::MonitoredSubmission;

/// Errors returned by monitor table operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor table channel closed")]
    ChannelClosed,

    #[error("No monitored submission with id {0}")]
    NotFound(String),
}

/// Commands processed by the monitor table actor
pub(crate) enum MonitorCommand {
    Put {
        id: String,
        entry: MonitoredSubmission,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<MonitoredSubmission>>,
    },
    /// First-write-wins update of an entry's playlist reference
    SetPlaylistRef {
        id: String,
        url: String,
        reply: oneshot::Sender<Result<bool, MonitorError>>,
    },
    /// Register a waiter resolved as soon as the playlist reference exists
    WaitPlaylistRef {
        id: String,
        reply: oneshot::Sender<Result<String, MonitorError>>,
    },
    Export {
        reply: oneshot::Sender<HashMap<String, MonitoredSubmission>>,
    },
    Shutdown,
}
