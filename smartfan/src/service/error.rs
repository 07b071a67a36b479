//! Service error types.

use thiserror::Error;

use crate::error::{ControlError, StorageError};

/// Errors raised by [`FanControlService`](super::FanControlService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No controller is registered for the entity.
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),

    /// A controller is already registered for the entity.
    #[error("Entity '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Learned settings cannot be applied yet.
    #[error("Learning confidence for '{entity_id}' is {confidence:.2}, need at least {required:.2}")]
    InsufficientConfidence {
        entity_id: String,
        confidence: f64,
        required: f64,
    },

    /// Nothing has been learned for the entity.
    #[error("No learned parameters for '{0}'")]
    NothingLearned(String),

    /// A decision cycle failed.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Persisting learning state failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A blocking store task panicked or was cancelled.
    #[error("Store task failed: {0}")]
    TaskFailed(String),
}
