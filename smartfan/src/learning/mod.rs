//! Adaptive learning.
//!
//! Each entity has one [`LearningState`]: a profile per fan mode, the
//! learned thermal inertia, the five learned parameters derived from it, and
//! the decision bookkeeping behind the confidence score.
//!
//! ```text
//! Observation ──► AdaptiveLearningEngine::observe
//!                   ├─ EMA update of the fan-mode profile
//!                   ├─ thermal inertia EMA (capped)
//!                   ├─ success per zone, confidence
//!                   └─ learned parameters (safety-bounded)
//!
//! every cycle:  blend(static, learned, confidence) ──► ControlParameters
//! ```
//!
//! Confidence is `0.5 × min(1, decisions / 100) + 0.5 × accuracy`; see
//! [`blend`] for how it weights learned against static parameters.

pub mod blend;
mod engine;
mod types;

pub use blend::{blend, blend_weight, safety_bounds};
pub use engine::{
    confidence, AdaptiveLearningEngine, LearningSummary, ModeSummary, Observation,
    ObservationOutcome, ResetScope, MIN_ACTIVATIONS_FOR_RECOMMENDATION, MIN_OBSERVATIONS,
    OVERSHOOT_THRESHOLD,
};
pub use types::{
    FanModeProfile, LearningMetadata, LearningState, ThermalParameters, MAX_THERMAL_INERTIA,
    SCHEMA_VERSION,
};
