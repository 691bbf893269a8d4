//! In-memory run history for tests and single-process use.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::modules::scheduler::models::{RunKey, RunRecord, RunStatus};

use super::run_history_repository::{BeginOutcome, RunCompletion, RunHistoryStore, StoreError};

/// In-memory append-only run history.
///
/// Enforces the same conflict rule as the MySQL store: one Running or
/// Succeeded record per key. Cloning creates a new handle to the same
/// underlying history.
pub struct MemoryRunHistoryStore {
    records: Arc<Mutex<Vec<RunRecord>>>,
}

impl Clone for MemoryRunHistoryStore {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl Default for MemoryRunHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRunHistoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of attempts recorded across all keys.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// All attempts for a key, oldest first.
    pub async fn attempts_for(&self, key: &RunKey) -> Vec<RunRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| &r.key == key)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RunHistoryStore for MemoryRunHistoryStore {
    async fn try_begin(&self, record: &RunRecord) -> Result<BeginOutcome, StoreError> {
        let mut records = self.records.lock().await;

        if let Some(blocking) = records
            .iter()
            .find(|r| r.key == record.key && r.status.blocks_new_attempt())
        {
            return Ok(BeginOutcome::Conflict(blocking.status));
        }

        records.push(record.clone());
        Ok(BeginOutcome::Accepted)
    }

    async fn complete(&self, id: &str, completion: RunCompletion) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;

        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if record.status.is_terminal() {
            return Err(StoreError::Terminal(id.to_string()));
        }

        record.finished_at = Some(Utc::now());
        match completion {
            RunCompletion::Succeeded { snapshot } => {
                record.status = RunStatus::Succeeded;
                record.snapshot = Some(snapshot);
            }
            RunCompletion::Failed { detail, snapshot } => {
                record.status = RunStatus::Failed;
                record.error_detail = Some(detail);
                record.snapshot = snapshot;
            }
        }

        Ok(())
    }

    async fn find_by_key(&self, key: &RunKey) -> Result<Option<RunRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().rev().find(|r| &r.key == key).cloned())
    }
}
