//! File-system backed run record store.
//!
//! Layout:
//! ```text
//! {base_dir}/runs/{run_id}.json
//! ```
//!
//! Each file is one JSON-serialized [`RunRecord`]. Writes are all-or-nothing
//! via temp-file-then-rename with fsync, so a concurrent reader sees either
//! the previous record or the new one, never a partial write.

use std::io::Write as _;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::RunStoreError;
use crate::traits::{RunFilter, RunRecordStore};
use crate::types::RunRecord;

/// File-system backed store for run records.
pub struct FileRunStore {
    base_dir: PathBuf,
}

impl FileRunStore {
    /// Create a new `FileRunStore` rooted at `base_dir`.
    ///
    /// Creates `{base_dir}/runs/` if it doesn't exist.
    pub fn new(base_dir: PathBuf) -> Result<Self, RunStoreError> {
        let runs_dir = base_dir.join("runs");
        std::fs::create_dir_all(&runs_dir).map_err(|e| RunStoreError::Store {
            message: format!("failed to create runs directory: {e}"),
        })?;
        Ok(Self { base_dir })
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.base_dir.join("runs").join(format!("{run_id}.json"))
    }

    fn read_record(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        let path = self.record_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| RunStoreError::Store {
            message: format!("failed to read record file: {e}"),
        })?;
        let record = serde_json::from_str(&content).map_err(|e| RunStoreError::Store {
            message: format!("failed to deserialize record: {e}"),
        })?;
        Ok(Some(record))
    }
}

#[async_trait]
impl RunRecordStore for FileRunStore {
    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, RunStoreError> {
        self.read_record(run_id)
    }

    async fn save(&self, record: &RunRecord) -> Result<(), RunStoreError> {
        let path = self.record_path(&record.run_id);
        let temp_path = path.with_extension("json.tmp");

        let bytes =
            serde_json::to_vec_pretty(record).map_err(|e| RunStoreError::Store {
                message: format!("failed to serialize record: {e}"),
            })?;

        let mut file = std::fs::File::create(&temp_path).map_err(|e| RunStoreError::Store {
            message: format!("failed to create temp file: {e}"),
        })?;
        file.write_all(&bytes).map_err(|e| RunStoreError::Store {
            message: format!("failed to write record: {e}"),
        })?;
        file.sync_all().map_err(|e| RunStoreError::Store {
            message: format!("failed to fsync: {e}"),
        })?;
        drop(file);

        std::fs::rename(&temp_path, &path).map_err(|e| RunStoreError::Store {
            message: format!("failed to rename temp file: {e}"),
        })
    }

    async fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, RunStoreError> {
        let runs_dir = self.base_dir.join("runs");
        let entries = std::fs::read_dir(&runs_dir).map_err(|e| RunStoreError::Store {
            message: format!("failed to read runs directory: {e}"),
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RunStoreError::Store {
                message: format!("failed to read dir entry: {e}"),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let run_id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            if let Some(record) = self.read_record(&run_id)? {
                if let Some(ref wid) = filter.workflow_id {
                    if record.workflow_id != *wid {
                        continue;
                    }
                }
                if let Some(status) = filter.status {
                    if record.status != status {
                        continue;
                    }
                }
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunStatus;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().to_path_buf()).unwrap();

        let mut record = RunRecord::new("campaign-workflow", "fp", json!({"x": 1}));
        record.suspend("approve-plan", json!({"reason": "review"}));
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Suspended);
        assert_eq!(loaded.suspension.unwrap().step, "approve-plan");
        assert_eq!(loaded.step_input, json!({"x": 1}));
    }

    #[tokio::test]
    async fn missing_run_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.load("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().to_path_buf()).unwrap();

        let mut record = RunRecord::new("wf", "fp", json!({}));
        store.save(&record).await.unwrap();
        record.finish_bailed(json!({"reason": "rejected"}));
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Bailed);
        assert_eq!(loaded.result, Some(json!({"reason": "rejected"})));
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().to_path_buf()).unwrap();

        let record = RunRecord::new("wf", "fp", json!({}));
        store.save(&record).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("runs"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn list_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().to_path_buf()).unwrap();

        let mut a = RunRecord::new("campaign", "fp", json!({}));
        a.finish_completed(json!({}));
        let b = RunRecord::new("monitor", "fp", json!({}));
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let all = store.list(&RunFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let completed = store
            .list(&RunFilter {
                workflow_id: None,
                status: Some(RunStatus::Completed),
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].workflow_id, "campaign");
    }

    #[tokio::test]
    async fn corrupted_record_surfaces_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRunStore::new(dir.path().to_path_buf()).unwrap();

        let record = RunRecord::new("wf", "fp", json!({}));
        store.save(&record).await.unwrap();
        std::fs::write(store.record_path(&record.run_id), "{not valid json").unwrap();

        let result = store.load(&record.run_id).await;
        assert!(result.is_err(), "corrupted JSON should error, got: {result:?}");
    }

    #[tokio::test]
    async fn concurrent_saves_of_distinct_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileRunStore::new(dir.path().to_path_buf()).unwrap());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let record = RunRecord::new("wf", "fp", json!({}));
                store.save(&record).await.unwrap();
                record.run_id
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        for id in ids {
            assert!(store.load(&id).await.unwrap().is_some());
        }
    }
}
