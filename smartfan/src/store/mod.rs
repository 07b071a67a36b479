//! Durable learning-state persistence.
//!
//! A [`LearningStore`] keeps one [`LearningState`] record per entity id.
//! Implementations must:
//!
//! - replace records atomically, so readers see the old or the new record,
//!   never a partial one
//! - serialize concurrent writes to the same entity
//! - never fail a load in a way that blocks the controller; [`LearningStore::load`]
//!   turns every failure into the default state
//!
//! Records are JSON documents carrying a `schema_version`; see [`schema`]
//! for versioning and migration of older layouts.

mod file;
mod memory;
pub mod schema;

pub use file::FileLearningStore;
pub use memory::InMemoryLearningStore;

use std::sync::Arc;

use crate::error::StorageError;
use crate::learning::LearningState;

/// Shared handle to a store.
pub type SharedLearningStore = Arc<dyn LearningStore>;

/// Key-value persistence of learning records keyed by entity id.
pub trait LearningStore: Send + Sync {
    /// Load the record for `entity_id`.
    ///
    /// `Ok(None)` when no record exists. Corrupted or incompatible records
    /// are errors here; use [`load`](Self::load) for the forgiving variant.
    fn try_load(&self, entity_id: &str) -> Result<Option<LearningState>, StorageError>;

    /// Atomically replace the record for `entity_id`.
    fn save(&self, entity_id: &str, state: &LearningState) -> Result<(), StorageError>;

    /// Delete the record for `entity_id`. Missing records are not an error.
    fn remove(&self, entity_id: &str) -> Result<(), StorageError>;

    /// Load the record for `entity_id`, falling back to defaults.
    fn load(&self, entity_id: &str) -> LearningState {
        match self.try_load(entity_id) {
            Ok(Some(state)) => {
                tracing::info!(
                    entity = entity_id,
                    decisions = state.metadata.total_decisions,
                    confidence = state.metadata.learning_confidence,
                    "Loaded learning state"
                );
                state
            }
            Ok(None) => {
                tracing::info!(entity = entity_id, "No learning state found, starting fresh");
                LearningState::default()
            }
            Err(e) => {
                tracing::warn!(
                    entity = entity_id,
                    error = %e,
                    "Learning state unusable, using defaults"
                );
                LearningState::default()
            }
        }
    }
}

/// File-name-safe form of an entity id.
///
/// Anything other than ASCII alphanumerics, `-` and `_` becomes `_`, so
/// `climate.living_room` maps to `climate_living_room`.
pub fn sanitize_key(entity_id: &str) -> String {
    entity_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
