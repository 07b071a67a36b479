//! The parameter set the decision engine runs with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Thresholds used to classify one decision cycle.
///
/// Either the static configuration or the blend of static and learned
/// values, recomputed every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlParameters {
    /// Tolerance band around the target (°C).
    pub deadband: f64,
    /// Error above which the controller recovers (°C).
    pub soft_error: f64,
    /// Error above which the controller jumps to maximum speed (°C).
    pub hard_error: f64,
    /// Minimum time between fan-mode changes (minutes).
    pub min_interval_minutes: f64,
    /// Projected error that triggers a predictive boost (°C).
    pub projection_threshold: f64,
}

impl ControlParameters {
    /// Minimum time between fan-mode changes.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_interval_minutes.max(0.0) * 60.0)
    }
}

impl Default for ControlParameters {
    fn default() -> Self {
        crate::config::ControllerConfig::default().static_parameters()
    }
}
