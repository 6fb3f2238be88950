//! Lifecycle and persistence coordination
//!
//! The coordinator supervises the watchers and the executor, restores the
//! previous snapshot at startup, and turns a termination request into an
//! orderly stop / drain / snapshot sequence so no accepted request is
//! silently lost across restarts.

mod core;
mod persistence;

pub use self::core::Daemon;
pub use persistence::{Snapshot, SnapshotStore};
