//! Shared monitor table
//!
//! Per-submission monitoring state (vote threshold, eventual playlist
//! reference) shared between the watchers and the executor. The table is an
//! explicit service: a single actor owns the map, handles are cheap clones.

mod messages;
mod table;

pub use messages::MonitorError;
pub use table::{MonitorTable, MonitoredSubmission};
