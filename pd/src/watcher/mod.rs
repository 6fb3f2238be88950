//! Event watchers
//!
//! Two independent watchers consume the discussion platform's live feeds:
//! the submission watcher turns qualifying posts into playlist tasks, the
//! comment watcher drives the suggestion/vote state machine. Both push onto
//! the shared work queue and stop cooperatively on the shutdown signal.

mod comments;
mod submissions;
mod votes;

pub use comments::{parse_add_command, CommentWatcher};
pub use submissions::{parse_title, SubmissionCommand, SubmissionWatcher};
pub use votes::{count_open_records, VoteLedger};
