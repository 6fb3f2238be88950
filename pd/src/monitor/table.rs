//! MonitorTable - actor that owns the shared monitor table
//!
//! Both watchers and the executor hold cloneable handles; the map itself is
//! owned by a single actor task, so there is no per-key locking anywhere.
//! Correctness rests on per-key single-writer discipline: the submission
//! watcher creates entries, only the executor sets `playlist_ref`, and the
//! comment watcher only reads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{MonitorCommand, MonitorError};

/// Monitoring state for one threshold-mode submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredSubmission {
    /// Votes needed before a suggestion is added; fixed at creation
    pub threshold: u32,

    /// Shareable playlist URL, set once by the executor after the
    /// playlist-creation task completes
    pub playlist_ref: Option<String>,
}

impl MonitoredSubmission {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            playlist_ref: None,
        }
    }
}

/// Handle to send commands to the monitor table actor
#[derive(Clone)]
pub struct MonitorTable {
    tx: mpsc::Sender<MonitorCommand>,
}

impl MonitorTable {
    /// Spawn a new monitor table actor with no entries
    pub fn spawn() -> Self {
        Self::with_entries(HashMap::new())
    }

    /// Spawn a new monitor table actor seeded with restored entries
    pub fn with_entries(entries: HashMap<String, MonitoredSubmission>) -> Self {
        let (tx, rx) = mpsc::channel(256);

        if !entries.is_empty() {
            info!(count = entries.len(), "Restoring monitored submissions");
        }
        tokio::spawn(actor_loop(entries, rx));

        Self { tx }
    }

    /// Register or replace a monitored submission
    pub async fn put(&self, id: &str, entry: MonitoredSubmission) -> Result<(), MonitorError> {
        self.tx
            .send(MonitorCommand::Put {
                id: id.to_string(),
                entry,
            })
            .await
            .map_err(|_| MonitorError::ChannelClosed)
    }

    /// Look up a monitored submission
    pub async fn get(&self, id: &str) -> Result<Option<MonitoredSubmission>, MonitorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::Get {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| MonitorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    /// Check whether a submission is monitored
    pub async fn contains(&self, id: &str) -> Result<bool, MonitorError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Set an entry's playlist reference, first write wins.
    ///
    /// Returns `true` if the reference was newly set, `false` if one was
    /// already present (the stored value is left unchanged, which makes the
    /// executor's local-effect retry safe).
    pub async fn set_playlist_ref(&self, id: &str, url: &str) -> Result<bool, MonitorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::SetPlaylistRef {
                id: id.to_string(),
                url: url.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| MonitorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| MonitorError::ChannelClosed)?
    }

    /// Wait until the entry's playlist reference is defined and return it.
    ///
    /// Resolves immediately when the reference already exists; otherwise the
    /// caller is parked until the executor sets it.
    pub async fn wait_playlist_ref(&self, id: &str) -> Result<String, MonitorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::WaitPlaylistRef {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| MonitorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| MonitorError::ChannelClosed)?
    }

    /// Export the full table contents for snapshotting
    pub async fn export(&self) -> Result<HashMap<String, MonitoredSubmission>, MonitorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MonitorCommand::Export { reply: reply_tx })
            .await
            .map_err(|_| MonitorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| MonitorError::ChannelClosed)
    }

    /// Shut down the actor
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        self.tx
            .send(MonitorCommand::Shutdown)
            .await
            .map_err(|_| MonitorError::ChannelClosed)
    }
}

/// The actor loop that owns the table and its playlist-ref waiters
async fn actor_loop(mut entries: HashMap<String, MonitoredSubmission>, mut rx: mpsc::Receiver<MonitorCommand>) {
    let mut waiters: HashMap<String, Vec<oneshot::Sender<String>>> = HashMap::new();

    debug!("Monitor table actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            MonitorCommand::Put { id, entry } => {
                debug!(%id, threshold = entry.threshold, "Registering monitored submission");
                entries.insert(id, entry);
            }

            MonitorCommand::Get { id, reply } => {
                let _ = reply.send(entries.get(&id).cloned());
            }

            MonitorCommand::SetPlaylistRef { id, url, reply } => {
                let result = match entries.get_mut(&id) {
                    None => Err(MonitorError::NotFound(id.clone())),
                    Some(entry) if entry.playlist_ref.is_some() => Ok(false),
                    Some(entry) => {
                        entry.playlist_ref = Some(url.clone());
                        Ok(true)
                    }
                };

                if result == Ok(true) {
                    debug!(%id, %url, "Playlist reference set");
                    for waiter in waiters.remove(&id).unwrap_or_default() {
                        let _ = waiter.send(url.clone());
                    }
                }

                let _ = reply.send(result);
            }

            MonitorCommand::WaitPlaylistRef { id, reply } => match entries.get(&id) {
                None => {
                    let _ = reply.send(Err(MonitorError::NotFound(id)));
                }
                Some(entry) => match &entry.playlist_ref {
                    Some(url) => {
                        let _ = reply.send(Ok(url.clone()));
                    }
                    None => {
                        debug!(%id, "Waiting for playlist reference");
                        let (waiter_tx, waiter_rx) = oneshot::channel();
                        waiters.entry(id).or_default().push(waiter_tx);

                        // Forward the eventual value without blocking the actor
                        tokio::spawn(async move {
                            match waiter_rx.await {
                                Ok(url) => {
                                    let _ = reply.send(Ok(url));
                                }
                                Err(_) => {
                                    warn!("Playlist reference waiter dropped before resolution");
                                    let _ = reply.send(Err(MonitorError::ChannelClosed));
                                }
                            }
                        });
                    }
                },
            },

            MonitorCommand::Export { reply } => {
                let _ = reply.send(entries.clone());
            }

            MonitorCommand::Shutdown => {
                debug!("Monitor table actor shutting down");
                break;
            }
        }
    }

    debug!("Monitor table actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let table = MonitorTable::spawn();

        table.put("s1", MonitoredSubmission::new(5)).await.unwrap();

        let entry = table.get("s1").await.unwrap().unwrap();
        assert_eq!(entry.threshold, 5);
        assert_eq!(entry.playlist_ref, None);

        assert!(table.get("missing").await.unwrap().is_none());
        assert!(table.contains("s1").await.unwrap());

        table.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_threshold_clamped_to_one() {
        let entry = MonitoredSubmission::new(0);
        assert_eq!(entry.threshold, 1);
    }

    #[tokio::test]
    async fn test_set_playlist_ref_first_write_wins() {
        let table = MonitorTable::spawn();
        table.put("s1", MonitoredSubmission::new(3)).await.unwrap();

        assert!(table.set_playlist_ref("s1", "https://example/p1").await.unwrap());

        // Second write is rejected and the stored value is unchanged
        assert!(!table.set_playlist_ref("s1", "https://example/p2").await.unwrap());
        let entry = table.get("s1").await.unwrap().unwrap();
        assert_eq!(entry.playlist_ref.as_deref(), Some("https://example/p1"));

        table.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_playlist_ref_unknown_submission() {
        let table = MonitorTable::spawn();

        let result = table.set_playlist_ref("ghost", "https://example/p").await;
        assert_eq!(result, Err(MonitorError::NotFound("ghost".into())));

        table.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_playlist_ref_immediate() {
        let table = MonitorTable::spawn();
        table.put("s1", MonitoredSubmission::new(1)).await.unwrap();
        table.set_playlist_ref("s1", "https://example/p1").await.unwrap();

        let url = table.wait_playlist_ref("s1").await.unwrap();
        assert_eq!(url, "https://example/p1");

        table.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_playlist_ref_resolves_on_set() {
        let table = MonitorTable::spawn();
        table.put("s1", MonitoredSubmission::new(1)).await.unwrap();

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.wait_playlist_ref("s1").await })
        };

        // Give the waiter time to register before the executor "completes"
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        table.set_playlist_ref("s1", "https://example/p1").await.unwrap();

        let url = waiter.await.unwrap().unwrap();
        assert_eq!(url, "https://example/p1");

        table.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_export_round_trips_through_restore() {
        let table = MonitorTable::spawn();
        table.put("s1", MonitoredSubmission::new(2)).await.unwrap();
        table.put("s2", MonitoredSubmission::new(7)).await.unwrap();
        table.set_playlist_ref("s2", "https://example/p2").await.unwrap();

        let exported = table.export().await.unwrap();
        table.shutdown().await.unwrap();

        let restored = MonitorTable::with_entries(exported);
        let entry = restored.get("s2").await.unwrap().unwrap();
        assert_eq!(entry.threshold, 7);
        assert_eq!(entry.playlist_ref.as_deref(), Some("https://example/p2"));

        restored.shutdown().await.unwrap();
    }
}
