//! Error types shared by the control pipeline and the learning store.
//!
//! None of these errors is fatal to the process. Control errors cost one
//! decision cycle (the previous fan mode is held), storage errors cost one
//! save (the in-memory learning state stays authoritative).

use thiserror::Error;

/// Errors raised by the forecaster and the decision engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// A numeric argument was malformed (negative horizon, NaN, ...).
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: String,
    },

    /// The cycle lacks a current or target temperature.
    #[error("Insufficient data: missing {0}")]
    InsufficientData(&'static str),

    /// No fan modes are known for the controlled entity.
    #[error("No fan modes available")]
    NoFanModes,
}

impl ControlError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ControlError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`LearningStore`](crate::store::LearningStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The stored record exists but could not be decoded.
    #[error("Learning record for '{entity_id}' is corrupted: {reason}")]
    Corrupted { entity_id: String, reason: String },

    /// The record was written by an incompatible schema.
    #[error("Learning record for '{entity_id}' has unsupported schema version {version}")]
    UnsupportedSchema { entity_id: String, version: u64 },

    /// Writing the record failed; the previous record is still intact.
    #[error("Failed to write learning record for '{entity_id}': {source}")]
    WriteFailed {
        entity_id: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading the record failed for a reason other than absence.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the record failed.
    #[error("Failed to encode learning record: {0}")]
    Encode(#[from] serde_json::Error),
}
