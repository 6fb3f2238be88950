//! Vote ledger
//!
//! Per-candidate-comment voter sets, owned by the comment watcher. Every
//! mutation rewrites the backing file so open tallies survive a hard
//! watcher interruption; the file is replaced atomically to tolerate a
//! crash mid-write.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{debug, info};

/// Voter sets keyed by candidate comment id, synced to disk on mutation
pub struct VoteLedger {
    path: PathBuf,
    records: HashMap<String, HashSet<String>>,
}

impl VoteLedger {
    /// Open the ledger at `path`, loading any previously persisted records
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let records = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read vote ledger")?;
            serde_json::from_str(&content).context("Failed to parse vote ledger")?
        } else {
            HashMap::new()
        };

        let ledger = Self { path, records };
        if !ledger.records.is_empty() {
            info!(candidates = ledger.records.len(), "Restored open vote records");
        }
        Ok(ledger)
    }

    /// Register a new candidate comment with an empty voter set.
    /// Re-registering an existing candidate leaves its votes intact.
    pub fn insert_candidate(&mut self, comment_id: &str) -> Result<()> {
        if self.records.contains_key(comment_id) {
            return Ok(());
        }

        debug!(%comment_id, "New candidate awaiting votes");
        self.records.insert(comment_id.to_string(), HashSet::new());
        self.persist()
    }

    /// Whether a comment has an open vote record
    pub fn is_candidate(&self, comment_id: &str) -> bool {
        self.records.contains_key(comment_id)
    }

    /// Add a voter to a candidate's set and return the new tally.
    /// Set semantics make a repeat vote a no-op. Returns `None` when the
    /// comment has no open record.
    pub fn add_vote(&mut self, comment_id: &str, voter_id: &str) -> Result<Option<usize>> {
        let Some(voters) = self.records.get_mut(comment_id) else {
            return Ok(None);
        };

        let added = voters.insert(voter_id.to_string());
        let tally = voters.len();
        if added {
            self.persist()?;
        }
        Ok(Some(tally))
    }

    /// Delete a candidate's record; returns whether one existed
    pub fn remove(&mut self, comment_id: &str) -> Result<bool> {
        let removed = self.records.remove(comment_id).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Number of open vote records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create ledger directory")?;
        }

        let content = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).context("Failed to write vote ledger")?;
        fs::rename(&tmp, &self.path).context("Failed to replace vote ledger")?;
        Ok(())
    }
}

/// Count the open vote records persisted at `path` without opening a ledger
pub fn count_open_records(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let content = fs::read_to_string(path).context("Failed to read vote ledger")?;
    let records: HashMap<String, HashSet<String>> =
        serde_json::from_str(&content).context("Failed to parse vote ledger")?;
    Ok(records.len())
}
