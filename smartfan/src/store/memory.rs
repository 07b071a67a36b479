//! In-memory store for tests and dry runs.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;

use super::{schema, LearningStore};
use crate::error::StorageError;
use crate::learning::LearningState;

/// Keeps encoded records in a map.
///
/// Records go through the same encoding as the file store. Writes can be
/// made to fail on demand to exercise retry paths.
#[derive(Debug, Default)]
pub struct InMemoryLearningStore {
    records: DashMap<String, Vec<u8>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes for `entity_id`, bypassing encoding.
    pub fn insert_raw(&self, entity_id: &str, bytes: Vec<u8>) {
        self.records.insert(entity_id.to_string(), bytes);
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.records.contains_key(entity_id)
    }
}

impl LearningStore for InMemoryLearningStore {
    fn try_load(&self, entity_id: &str) -> Result<Option<LearningState>, StorageError> {
        match self.records.get(entity_id) {
            Some(bytes) => schema::decode(entity_id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, entity_id: &str, state: &LearningState) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                entity_id: entity_id.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "writes disabled"),
            });
        }
        let bytes = schema::encode(state)?;
        self.records.insert(entity_id.to_string(), bytes);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, entity_id: &str) -> Result<(), StorageError> {
        self.records.remove(entity_id);
        Ok(())
    }
}
