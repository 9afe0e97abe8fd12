//! Failure audit trail for notification dispatches.
//!
//! Entries are written under their own key and referenced from a bounded
//! index (`[{key, id}, ...]`, oldest first) so that the most recent entries
//! can be read without scanning the store. Entries are never edited.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtrack_core::{AuditStore, FailureLogEntry, Result};

pub const INDEX_KEY: &str = "reminder_failure_index";
const ENTRY_PREFIX: &str = "reminder_failure_";
const DEFAULT_CAPACITY: usize = 100;

/// One index slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub key: String,
    pub id: u64,
}

/// Append-only failure log over an [`AuditStore`].
#[derive(Clone)]
pub struct FailureLog {
    store: Arc<dyn AuditStore>,
    capacity: usize,
}

impl FailureLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store, capacity: DEFAULT_CAPACITY }
    }

    /// Keep at most `capacity` entries in the index.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Append `entry`, returning its id.
    pub async fn append(&self, entry: &FailureLogEntry) -> Result<u64> {
        let mut index = self.read_index().await?;
        let id = index.last().map(|e| e.id + 1).unwrap_or(1);
        let key = format!("{ENTRY_PREFIX}{}_{id}", entry.timestamp.timestamp_millis());

        self.store.put(&key, &serde_json::to_string(entry)?).await?;

        index.push(IndexEntry { key, id });
        if index.len() > self.capacity {
            let overflow = index.len() - self.capacity;
            index.drain(..overflow);
        }
        self.store.put(INDEX_KEY, &serde_json::to_string(&index)?).await?;

        tracing::debug!("🗒️ Failure log entry {id} recorded for '{}'", entry.title);
        Ok(id)
    }

    /// Up to `limit` most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<FailureLogEntry>> {
        let index = self.read_index().await?;
        let mut entries = Vec::new();
        for slot in index.iter().rev().take(limit) {
            let Some(raw) = self.store.get(&slot.key).await? else {
                tracing::warn!("⚠️ Failure log entry {} is missing", slot.key);
                continue;
            };
            match serde_json::from_str::<FailureLogEntry>(&raw) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!("⚠️ Failure log entry {} unreadable: {e}", slot.key),
            }
        }
        Ok(entries)
    }

    /// Current index, oldest first.
    pub async fn read_index(&self) -> Result<Vec<IndexEntry>> {
        match self.store.get(INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failure log index unreadable, starting over: {e}");
                Vec::new()
            })),
            None => Ok(Vec::new()),
        }
    }
}
