use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::db::{BaselineRecord, BaselineStore, StoreError};
use crate::model::CanonicalForm;

/// In-memory baseline store.
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    records: RwLock<HashMap<String, BaselineRecord>>,
    snapshots: RwLock<HashMap<String, CanonicalForm>>,
    puts: AtomicUsize,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn get(&self, artifact_id: &str) -> Result<Option<BaselineRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned("baseline records"))?;
        Ok(records.get(artifact_id).cloned())
    }

    fn put(&self, artifact_id: &str, record: BaselineRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned("baseline records"))?;
        records.insert(artifact_id.to_string(), record);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn snapshot(&self, artifact_id: &str) -> Result<Option<CanonicalForm>, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned("baseline snapshots"))?;
        Ok(snapshots.get(artifact_id).cloned())
    }

    fn put_snapshot(&self, artifact_id: &str, form: &CanonicalForm) -> Result<(), StoreError> {
        let mut snapshots =
            self.snapshots.write().map_err(|_| StoreError::Poisoned("baseline snapshots"))?;
        snapshots.insert(artifact_id.to_string(), form.clone());
        Ok(())
    }

    fn reset(&self, artifact_id: &str) -> Result<bool, StoreError> {
        let mut snapshots =
            self.snapshots.write().map_err(|_| StoreError::Poisoned("baseline snapshots"))?;
        snapshots.remove(artifact_id);
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned("baseline records"))?;
        Ok(records.remove(artifact_id).is_some())
    }
}
