//! Record encoding and schema migration.
//!
//! | version | layout |
//! |---------|--------|
//! | 1 | `"version": "1.0"`, metadata under `learning_metadata` |
//! | 2 | `"schema_version": 2`, metadata under `metadata` |
//!
//! Version 1 records are migrated on load. Records from a newer version are
//! rejected with [`StorageError::UnsupportedSchema`] and the caller starts
//! from defaults.

use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::learning::{LearningState, SCHEMA_VERSION};

const LEGACY_VERSION: u64 = 1;

/// Keys of the version 1 layout with no counterpart in version 2.
const LEGACY_ONLY_KEYS: &[&str] = &["version", "climate_entity_id", "environment_metrics"];

/// Serialize a record.
pub fn encode(state: &LearningState) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec_pretty(state)?)
}

/// Deserialize a record of any supported version.
///
/// The result is sanitized, so out-of-range values never reach the engine.
pub fn decode(entity_id: &str, bytes: &[u8]) -> Result<LearningState, StorageError> {
    let corrupted = |reason: String| StorageError::Corrupted {
        entity_id: entity_id.to_string(),
        reason,
    };

    let value: Value = serde_json::from_slice(bytes).map_err(|e| corrupted(e.to_string()))?;
    let Value::Object(mut record) = value else {
        return Err(corrupted("record is not a JSON object".to_string()));
    };

    match detect_version(&record) {
        Some(SCHEMA_VERSION) => {}
        Some(LEGACY_VERSION) => {
            migrate_v1(&mut record);
            tracing::info!(entity = entity_id, "Migrated learning record from schema 1");
        }
        Some(version) => {
            return Err(StorageError::UnsupportedSchema {
                entity_id: entity_id.to_string(),
                version,
            })
        }
        None => return Err(corrupted("missing schema version".to_string())),
    }

    let state: LearningState =
        serde_json::from_value(Value::Object(record)).map_err(|e| corrupted(e.to_string()))?;
    Ok(state.sanitize())
}

fn detect_version(record: &Map<String, Value>) -> Option<u64> {
    if let Some(version) = record.get("schema_version") {
        return version.as_u64();
    }
    // Legacy records carry a "major.minor" string.
    let legacy = record.get("version")?.as_str()?;
    legacy.split('.').next()?.parse().ok()
}

fn migrate_v1(record: &mut Map<String, Value>) {
    if let Some(metadata) = record.remove("learning_metadata") {
        record.insert("metadata".to_string(), metadata);
    }
    for key in LEGACY_ONLY_KEYS {
        record.remove(*key);
    }
    record.insert("schema_version".to_string(), Value::from(SCHEMA_VERSION));
}
