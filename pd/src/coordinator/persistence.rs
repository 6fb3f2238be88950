//! Snapshot persistence for crash and restart recovery
//!
//! Two artifacts under the data dir: the pending work queue as JSONL (one
//! envelope per line, original order) and the monitor table as a JSON map.
//! Files are replaced atomically via temp-file + rename, so a crash during
//! shutdown leaves the previous snapshot intact; nothing is ever deleted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tokio::fs;
use tracing::{debug, info};

use crate::monitor::MonitoredSubmission;
use crate::task::TaskEnvelope;

/// Everything persisted at shutdown and restored at startup
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Pending queue entries in their original enqueue order
    pub queue: Vec<TaskEnvelope>,
    /// Full monitor table contents
    pub monitors: HashMap<String, MonitoredSubmission>,
}

/// Snapshot store rooted at the daemon's data directory
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn queue_file(&self) -> PathBuf {
        self.data_dir.join("queue.jsonl")
    }

    fn monitors_file(&self) -> PathBuf {
        self.data_dir.join("monitors.json")
    }

    /// Where the comment watcher keeps its vote ledger
    pub fn votes_file(&self) -> PathBuf {
        self.data_dir.join("votes.json")
    }

    /// Restore the previous snapshot. Missing files mean a fresh start.
    pub async fn load(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        let queue_file = self.queue_file();
        if queue_file.exists() {
            let content = fs::read_to_string(&queue_file)
                .await
                .context("Failed to read queue snapshot")?;

            for (number, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let envelope: TaskEnvelope = serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse queue snapshot line {}", number + 1))?;
                snapshot.queue.push(envelope);
            }
        }

        let monitors_file = self.monitors_file();
        if monitors_file.exists() {
            let content = fs::read_to_string(&monitors_file)
                .await
                .context("Failed to read monitor snapshot")?;
            snapshot.monitors = serde_json::from_str(&content).context("Failed to parse monitor snapshot")?;
        }

        if !snapshot.queue.is_empty() || !snapshot.monitors.is_empty() {
            info!(
                pending_tasks = snapshot.queue.len(),
                monitored = snapshot.monitors.len(),
                "Restored snapshot"
            );
        } else {
            debug!("No prior snapshot found");
        }

        Ok(snapshot)
    }

    /// Write a new snapshot, replacing any prior one only once each artifact
    /// is fully on disk.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.data_dir)
            .await
            .context("Failed to create snapshot directory")?;

        let mut lines = String::new();
        for envelope in &snapshot.queue {
            lines.push_str(&serde_json::to_string(envelope)?);
            lines.push('\n');
        }
        write_atomic(&self.queue_file(), &lines).await?;

        let monitors = serde_json::to_string_pretty(&snapshot.monitors)?;
        write_atomic(&self.monitors_file(), &monitors).await?;

        info!(
            pending_tasks = snapshot.queue.len(),
            monitored = snapshot.monitors.len(),
            "Snapshot written"
        );
        Ok(())
    }
}

/// Write via a temp file and rename so readers never see a partial file
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
