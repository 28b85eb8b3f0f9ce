//! In-memory run record store for testing and lightweight usage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::RunStoreError;
use crate::traits::{RunFilter, RunRecordStore};
use crate::types::RunRecord;

/// In-memory implementation of [`RunRecordStore`].
///
/// Uses `BTreeMap` for deterministic iteration order (project convention).
/// The `RwLock` makes each `save` atomic with respect to concurrent `load`s.
/// Suitable for tests and short-lived processes.
pub struct InMemoryRunStore {
    runs: RwLock<BTreeMap<String, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunRecordStore for InMemoryRunStore {
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        let mut runs = self.runs.write().await;
        runs.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, RunStoreError> {
        let runs = self.runs.read().await;
        Ok(runs
            .values()
            .filter(|r| {
                if let Some(ref wid) = filter.workflow_id {
                    if r.workflow_id != *wid {
                        return false;
                    }
                }
                if let Some(status) = filter.status {
                    if r.status != status {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect())
    }
}
