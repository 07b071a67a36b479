//! The persisted learning record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fan_mode::FanMode;

/// Current layout version of [`LearningState`].
pub const SCHEMA_VERSION: u64 = 2;

/// Upper bound of the learned thermal inertia (hours per °C).
pub const MAX_THERMAL_INERTIA: f64 = 10.0;

/// Inertia assumed before anything is learned.
pub const DEFAULT_THERMAL_INERTIA: f64 = 0.5;

/// Default forecast horizon (minutes).
pub const DEFAULT_PREDICTION_WINDOW_MINUTES: f64 = 10.0;

/// Response time assumed before anything is learned (seconds).
pub const DEFAULT_RESPONSE_TIME_SECS: f64 = 300.0;

/// Current local time as RFC 3339.
pub(crate) fn timestamp_now() -> String {
    chrono::Local::now().to_rfc3339()
}

/// What one fan speed has been observed to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanModeProfile {
    /// EMA of the slope change after activation (°C/h).
    pub avg_slope_change: f64,
    /// EMA of the observation period length (seconds).
    pub avg_response_time: f64,
    /// Normalized response strength in [0, 1].
    pub effectiveness_score: f64,
    /// Number of observations attributed to this mode.
    pub activation_count: u64,
    /// When the profile last changed (RFC 3339).
    pub last_updated: Option<String>,
    /// Observations that ended beyond the target.
    #[serde(alias = "total_overshoot_events")]
    pub overshoot_events: u64,
    /// Observations that moved away from an unreached target.
    #[serde(alias = "total_undershoot_events")]
    pub undershoot_events: u64,
    /// EMA of the temperature change rate (°C/h).
    pub avg_temp_change_rate: f64,
}

impl Default for FanModeProfile {
    fn default() -> Self {
        Self {
            avg_slope_change: 0.0,
            avg_response_time: 0.0,
            effectiveness_score: 0.0,
            activation_count: 0,
            last_updated: None,
            overshoot_events: 0,
            undershoot_events: 0,
            avg_temp_change_rate: 0.0,
        }
    }
}

impl FanModeProfile {
    /// Fraction of activations that overshot.
    pub fn overshoot_rate(&self) -> f64 {
        if self.activation_count == 0 {
            0.0
        } else {
            self.overshoot_events as f64 / self.activation_count as f64
        }
    }
}

/// Learned thermal behavior of the room and the derived parameters.
///
/// The `adaptive_*` values stay `None` until the first observation; `None`
/// means "use the static value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalParameters {
    /// Hours needed per °C of change, EMA, in `[0, MAX_THERMAL_INERTIA]`.
    pub learned_thermal_inertia: f64,
    /// Forecast horizon (minutes).
    pub optimal_prediction_window: f64,
    /// EMA of the observation period length (seconds).
    pub avg_response_time: f64,
    pub adaptive_deadband: Option<f64>,
    pub adaptive_soft_error: Option<f64>,
    pub adaptive_hard_error: Option<f64>,
    pub adaptive_min_interval: Option<f64>,
    pub adaptive_projection_threshold: Option<f64>,
}

impl Default for ThermalParameters {
    fn default() -> Self {
        Self {
            learned_thermal_inertia: DEFAULT_THERMAL_INERTIA,
            optimal_prediction_window: DEFAULT_PREDICTION_WINDOW_MINUTES,
            avg_response_time: DEFAULT_RESPONSE_TIME_SECS,
            adaptive_deadband: None,
            adaptive_soft_error: None,
            adaptive_hard_error: None,
            adaptive_min_interval: None,
            adaptive_projection_threshold: None,
        }
    }
}

/// Decision bookkeeping and confidence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningMetadata {
    pub total_decisions: u64,
    pub successful_predictions: u64,
    /// Trust in the learned parameters, in [0, 1].
    pub learning_confidence: f64,
    /// When the record was last persisted (RFC 3339).
    pub last_saved: Option<String>,
    /// When the record was first created (RFC 3339).
    pub created_at: Option<String>,
}

/// Everything learned about one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    #[serde(default = "current_schema")]
    pub schema_version: u64,
    #[serde(default)]
    pub fan_mode_profiles: BTreeMap<FanMode, FanModeProfile>,
    #[serde(default)]
    pub thermal_parameters: ThermalParameters,
    #[serde(default)]
    pub metadata: LearningMetadata,
}

fn current_schema() -> u64 {
    SCHEMA_VERSION
}

impl Default for LearningState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            fan_mode_profiles: BTreeMap::new(),
            thermal_parameters: ThermalParameters::default(),
            metadata: LearningMetadata::default(),
        }
    }
}

impl LearningState {
    /// A fresh record stamped with its creation time.
    pub fn new() -> Self {
        let mut state = Self::default();
        state.metadata.created_at = Some(timestamp_now());
        state
    }

    /// Force every value back into its valid range.
    ///
    /// Non-finite numbers fall back to their defaults. Records written by
    /// this crate pass through unchanged.
    pub fn sanitize(mut self) -> Self {
        let defaults = ThermalParameters::default();
        let thermal = &mut self.thermal_parameters;
        thermal.learned_thermal_inertia = finite_or(
            thermal.learned_thermal_inertia,
            defaults.learned_thermal_inertia,
        )
        .clamp(0.0, MAX_THERMAL_INERTIA);
        thermal.optimal_prediction_window = finite_or(
            thermal.optimal_prediction_window,
            defaults.optimal_prediction_window,
        )
        .max(0.0);
        thermal.avg_response_time =
            finite_or(thermal.avg_response_time, defaults.avg_response_time).max(0.0);
        for value in [
            &mut thermal.adaptive_deadband,
            &mut thermal.adaptive_soft_error,
            &mut thermal.adaptive_hard_error,
            &mut thermal.adaptive_min_interval,
            &mut thermal.adaptive_projection_threshold,
        ] {
            *value = value.filter(|v| v.is_finite() && *v >= 0.0);
        }

        for profile in self.fan_mode_profiles.values_mut() {
            profile.avg_slope_change = finite_or(profile.avg_slope_change, 0.0);
            profile.avg_response_time = finite_or(profile.avg_response_time, 0.0).max(0.0);
            profile.avg_temp_change_rate = finite_or(profile.avg_temp_change_rate, 0.0);
            profile.effectiveness_score =
                finite_or(profile.effectiveness_score, 0.0).clamp(0.0, 1.0);
        }

        let metadata = &mut self.metadata;
        metadata.successful_predictions = metadata
            .successful_predictions
            .min(metadata.total_decisions);
        metadata.learning_confidence =
            finite_or(metadata.learning_confidence, 0.0).clamp(0.0, 1.0);

        self.schema_version = SCHEMA_VERSION;
        self
    }

    /// Profile for `mode`, if it was ever observed.
    pub fn profile(&self, mode: &FanMode) -> Option<&FanModeProfile> {
        self.fan_mode_profiles.get(mode)
    }

    pub fn confidence(&self) -> f64 {
        self.metadata.learning_confidence
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
