//! One JSON file per entity.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{sanitize_key, schema, LearningStore};
use crate::error::StorageError;
use crate::learning::LearningState;

/// Stores each entity's record as `learning_<entity>.json` in a directory.
///
/// Saves write a sibling `.tmp` file, flush it to disk and rename it over
/// the record, so a crash leaves either the old or the new record. Writes
/// to the same entity are serialized by a per-entity lock.
#[derive(Debug)]
pub struct FileLearningStore {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileLearningStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `entity_id`.
    pub fn path_for(&self, entity_id: &str) -> PathBuf {
        self.dir
            .join(format!("learning_{}.json", sanitize_key(entity_id)))
    }

    fn lock_for(&self, entity_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(sanitize_key(entity_id))
            .or_default()
            .clone()
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("json.tmp");
        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

impl LearningStore for FileLearningStore {
    fn try_load(&self, entity_id: &str) -> Result<Option<LearningState>, StorageError> {
        let path = self.path_for(entity_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        schema::decode(entity_id, &bytes).map(Some)
    }

    fn save(&self, entity_id: &str, state: &LearningState) -> Result<(), StorageError> {
        let bytes = schema::encode(state)?;
        let path = self.path_for(entity_id);

        let lock = self.lock_for(entity_id);
        let _guard = lock.lock();
        Self::write_atomic(&path, &bytes).map_err(|source| StorageError::WriteFailed {
            entity_id: entity_id.to_string(),
            source,
        })?;

        tracing::debug!(
            entity = entity_id,
            path = %path.display(),
            bytes = bytes.len(),
            "Learning state saved"
        );
        Ok(())
    }

    fn remove(&self, entity_id: &str) -> Result<(), StorageError> {
        let lock = self.lock_for(entity_id);
        let _guard = lock.lock();
        match fs::remove_file(self.path_for(entity_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan_mode::FanMode;
    use crate::learning::{FanModeProfile, SCHEMA_VERSION};
    use tempfile::TempDir;

    fn sample_state() -> LearningState {
        let mut state = LearningState::new();
        state.metadata.total_decisions = 17;
        state.metadata.successful_predictions = 11;
        state.metadata.learning_confidence = 0.4085294117647059;
        state.thermal_parameters.learned_thermal_inertia = 0.8333333333333334;
        state.thermal_parameters.adaptive_soft_error = Some(0.30000000000000004);
        state.fan_mode_profiles.insert(
            FanMode::from("turbo"),
            FanModeProfile {
                avg_slope_change: 0.6561,
                avg_response_time: 301.7,
                effectiveness_score: 1.0,
                activation_count: 17,
                last_updated: Some("2026-01-10T08:15:00+01:00".to_string()),
                overshoot_events: 2,
                undershoot_events: 0,
                avg_temp_change_rate: 1.234e-5,
            },
        );
        state
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path());
        let state = sample_state();

        store.save("climate.living_room", &state).unwrap();
        let loaded = store.try_load("climate.living_room").unwrap().unwrap();
        assert_eq!(loaded, state);

        // Saving what was loaded reproduces the same bytes.
        let path = store.path_for("climate.living_room");
        let first = fs::read(&path).unwrap();
        store.save("climate.living_room", &loaded).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_file_name_and_no_leftover_temp() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path().join("nested"));
        store.save("climate.living_room", &sample_state()).unwrap();

        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["learning_climate_living_room.json"]);
    }

    #[test]
    fn test_missing_record_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path());
        assert!(store.try_load("climate.office").unwrap().is_none());
        assert_eq!(store.load("climate.office"), LearningState::default());
    }

    #[test]
    fn test_truncated_record_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path());
        store.save("climate.office", &sample_state()).unwrap();

        let path = store.path_for("climate.office");
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(matches!(
            store.try_load("climate.office"),
            Err(StorageError::Corrupted { .. })
        ));
        assert_eq!(store.load("climate.office"), LearningState::default());
    }

    #[test]
    fn test_future_schema_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path());
        let record = format!("{{\"schema_version\": {}}}", SCHEMA_VERSION + 1);
        fs::write(store.path_for("climate.office"), record).unwrap();

        assert_eq!(store.load("climate.office"), LearningState::default());
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path());
        store.save("climate.office", &sample_state()).unwrap();
        store.remove("climate.office").unwrap();
        assert!(!store.path_for("climate.office").exists());
        // Removing twice is fine.
        store.remove("climate.office").unwrap();
    }

    #[test]
    fn test_write_failure_keeps_previous_record() {
        let temp = TempDir::new().unwrap();
        let store = FileLearningStore::new(temp.path());
        let state = sample_state();
        store.save("climate.office", &state).unwrap();

        // A directory where the temp file should go makes the write fail.
        let path = store.path_for("climate.office");
        fs::create_dir(path.with_extension("json.tmp")).unwrap();

        let mut newer = state.clone();
        newer.metadata.total_decisions += 1;
        let err = store.save("climate.office", &newer).unwrap_err();
        assert!(matches!(err, StorageError::WriteFailed { .. }));
        assert_eq!(store.try_load("climate.office").unwrap().unwrap(), state);
    }

    #[test]
    fn test_concurrent_saves_leave_a_complete_record() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(FileLearningStore::new(temp.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let mut state = sample_state();
                    state.metadata.total_decisions = 100 + i;
                    for _ in 0..10 {
                        store.save("climate.shared", &state).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let loaded = store.try_load("climate.shared").unwrap().unwrap();
        assert!((100..108).contains(&loaded.metadata.total_decisions));
    }
}
