//! Online learning from observed fan-mode outcomes.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::blend::{blend, safety_bounds, CONFIDENCE_THRESHOLD_HIGH, CONFIDENCE_THRESHOLD_LOW};
use super::types::{timestamp_now, FanModeProfile, LearningState, MAX_THERMAL_INERTIA};
use crate::config::{ControllerConfig, LEARNING_RATE_RANGE};
use crate::decision::{ControlParameters, HvacMode, Zone};
use crate::fan_mode::FanMode;

/// Decisions after which observation confidence saturates.
pub const MIN_OBSERVATIONS: u64 = 100;

/// Activations a mode needs before it can be recommended.
pub const MIN_ACTIVATIONS_FOR_RECOMMENDATION: u64 = 5;

/// Distance past the target that counts as overshoot (°C).
pub const OVERSHOOT_THRESHOLD: f64 = 0.2;

/// Slope change that maps to full effectiveness (°C/h).
const FULL_EFFECT_SLOPE_CHANGE: f64 = 0.5;

/// Floor for the temperature change in the inertia estimate (°C).
const MIN_TEMP_CHANGE: f64 = 0.01;

/// Errors above this favor modes with a strong response (°C).
const LARGE_ERROR: f64 = 0.5;

/// One fan-mode period, from the anchor cycle to the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub fan_mode_before: FanMode,
    pub fan_mode_after: FanMode,
    pub temp_before: f64,
    pub temp_after: f64,
    pub elapsed: Duration,
    /// Slope at the anchor (°C/h).
    pub slope_before: f64,
    /// Slope now (°C/h).
    pub slope_after: f64,
    pub target: f64,
    /// Zone of the decision that opened the period.
    pub zone: Zone,
    pub hvac_mode: HvacMode,
}

/// What [`AdaptiveLearningEngine::observe`] concluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationOutcome {
    /// Whether the zone's expected outcome was confirmed.
    pub success: bool,
    pub overshoot: bool,
    pub undershoot: bool,
    /// Effectiveness of the observed mode after the update.
    pub effectiveness: f64,
    /// Confidence after the update.
    pub confidence: f64,
}

/// Scope of a learning reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    /// Everything learned for the entity.
    All,
    /// One fan mode's profile.
    FanMode(FanMode),
}

/// Per-mode entry of a [`LearningSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeSummary {
    pub activations: u64,
    pub effectiveness: f64,
    pub avg_slope_change: f64,
    pub overshoots: u64,
    pub undershoots: u64,
}

/// Operator-facing snapshot of the learning state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningSummary {
    pub enabled: bool,
    pub confidence: f64,
    pub total_decisions: u64,
    pub successful_predictions: u64,
    pub thermal_inertia: f64,
    pub avg_response_time: f64,
    pub fan_modes: BTreeMap<String, ModeSummary>,
    /// Parameters the controller is currently running with.
    pub active_parameters: ControlParameters,
    pub last_saved: Option<String>,
}

/// Learns how each fan mode affects the room and adapts the parameters.
///
/// Owns one entity's [`LearningState`]. Persistence is the caller's job:
/// [`is_dirty`](Self::is_dirty) reports unsaved changes and
/// [`mark_saved`](Self::mark_saved) clears them.
#[derive(Debug, Clone)]
pub struct AdaptiveLearningEngine {
    state: LearningState,
    enabled: bool,
    learning_rate: f64,
    static_params: ControlParameters,
    dirty: bool,
    decisions_since_save: u64,
}

impl AdaptiveLearningEngine {
    /// Create an engine over a loaded (or default) state.
    pub fn new(state: LearningState, config: &ControllerConfig) -> Self {
        let mut engine = Self {
            state,
            enabled: true,
            learning_rate: 0.0,
            static_params: ControlParameters::default(),
            dirty: false,
            decisions_since_save: 0,
        };
        engine.reconfigure(config);
        info!(
            enabled = engine.enabled,
            rate = engine.learning_rate,
            confidence = engine.confidence(),
            "Adaptive learning initialized"
        );
        engine
    }

    /// Apply a new static configuration, keeping the learned state.
    pub fn reconfigure(&mut self, config: &ControllerConfig) {
        let (min, max) = LEARNING_RATE_RANGE;
        self.enabled = config.enable_adaptive_learning;
        self.learning_rate = config.learning_rate.clamp(min, max);
        self.static_params = config.static_parameters();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn confidence(&self) -> f64 {
        self.state.metadata.learning_confidence
    }

    pub fn state(&self) -> &LearningState {
        &self.state
    }

    /// Whether there are changes not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Observations applied since the last successful save.
    pub fn decisions_since_save(&self) -> u64 {
        self.decisions_since_save
    }

    /// Copy of the state stamped with the save time, ready to persist.
    pub fn snapshot_for_save(&self) -> LearningState {
        let mut snapshot = self.state.clone();
        snapshot.metadata.last_saved = Some(timestamp_now());
        snapshot
    }

    /// Record that `snapshot` was persisted.
    pub fn mark_saved(&mut self, snapshot: &LearningState) {
        self.state.metadata.last_saved = snapshot.metadata.last_saved.clone();
        self.dirty = false;
        self.decisions_since_save = 0;
    }

    /// Learned parameters before blending, or `None` until something has
    /// been learned.
    pub fn learned_parameters(&self) -> Option<ControlParameters> {
        let thermal = &self.state.thermal_parameters;
        Some(ControlParameters {
            deadband: thermal.adaptive_deadband?,
            soft_error: thermal.adaptive_soft_error?,
            hard_error: thermal.adaptive_hard_error?,
            min_interval_minutes: thermal.adaptive_min_interval?,
            projection_threshold: thermal.adaptive_projection_threshold?,
        })
    }

    /// Parameters for the current cycle.
    pub fn adaptive_parameters(&self) -> ControlParameters {
        if !self.enabled {
            return self.static_params;
        }
        match self.learned_parameters() {
            Some(learned) => blend(&self.static_params, &learned, self.confidence()),
            None => self.static_params,
        }
    }

    /// Learned parameters suitable for becoming the new static defaults.
    ///
    /// `None` while confidence is below the blending threshold.
    pub fn promote_learned(&self) -> Option<ControlParameters> {
        if self.confidence() < CONFIDENCE_THRESHOLD_LOW {
            return None;
        }
        self.learned_parameters()
            .map(|learned| safety_bounds(&self.static_params, &learned))
    }

    /// Learn from one fan-mode period.
    ///
    /// Returns `None` when learning is disabled or the period has no
    /// duration. Never persists anything.
    pub fn observe(&mut self, observation: &Observation) -> Option<ObservationOutcome> {
        if !self.enabled {
            return None;
        }
        let elapsed_secs = observation.elapsed.as_secs_f64();
        if elapsed_secs <= 0.0 {
            return None;
        }
        let values = [
            observation.temp_before,
            observation.temp_after,
            observation.slope_before,
            observation.slope_after,
            observation.target,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            debug!("Skipping observation with non-finite values");
            return None;
        }

        let rate = self.learning_rate;
        let elapsed_hours = elapsed_secs / 3600.0;
        let temp_change = observation.temp_after - observation.temp_before;
        let slope_change = observation.slope_after - observation.slope_before;
        let temp_change_rate = temp_change / elapsed_hours;

        let hvac = observation.hvac_mode;
        let error_before = hvac.signed_error(observation.temp_before, observation.target);
        let error_after = hvac.signed_error(observation.temp_after, observation.target);
        let overshoot = error_after < -OVERSHOOT_THRESHOLD;
        let undershoot = hvac.directed(temp_change) < 0.0 && error_before > 0.0;

        let profile = self
            .state
            .fan_mode_profiles
            .entry(observation.fan_mode_after.clone())
            .or_default();
        profile.avg_slope_change = ema(rate, slope_change, profile.avg_slope_change);
        profile.avg_response_time = ema(rate, elapsed_secs, profile.avg_response_time);
        profile.avg_temp_change_rate = ema(rate, temp_change_rate, profile.avg_temp_change_rate);
        profile.activation_count += 1;
        profile.last_updated = Some(timestamp_now());
        if overshoot {
            profile.overshoot_events += 1;
        }
        if undershoot {
            profile.undershoot_events += 1;
        }
        profile.effectiveness_score = effectiveness(profile);
        let effectiveness = profile.effectiveness_score;

        let thermal = &mut self.state.thermal_parameters;
        let observed_inertia =
            (elapsed_hours / temp_change.abs().max(MIN_TEMP_CHANGE)).min(MAX_THERMAL_INERTIA);
        thermal.learned_thermal_inertia = ema(rate, observed_inertia, thermal.learned_thermal_inertia)
            .clamp(0.0, MAX_THERMAL_INERTIA);
        thermal.avg_response_time = ema(rate, elapsed_secs, thermal.avg_response_time);

        let success = zone_succeeded(observation.zone, error_before, error_after, overshoot);
        let metadata = &mut self.state.metadata;
        metadata.total_decisions += 1;
        if success {
            metadata.successful_predictions += 1;
        }
        metadata.learning_confidence =
            confidence(metadata.total_decisions, metadata.successful_predictions);
        let confidence = metadata.learning_confidence;

        self.recompute_learned_parameters();
        self.dirty = true;
        self.decisions_since_save += 1;

        debug!(
            fan_mode = %observation.fan_mode_after,
            from = %observation.fan_mode_before,
            zone = %observation.zone,
            temp_change,
            slope_change,
            effectiveness,
            overshoot,
            success,
            confidence,
            "Learning update"
        );

        Some(ObservationOutcome {
            success,
            overshoot,
            undershoot,
            effectiveness,
            confidence,
        })
    }

    fn recompute_learned_parameters(&mut self) {
        let thermal = &mut self.state.thermal_parameters;
        let inertia = thermal.learned_thermal_inertia;
        let response_minutes = thermal.avg_response_time / 60.0;
        let raw = ControlParameters {
            deadband: inertia * 0.4,
            soft_error: inertia * 0.6,
            hard_error: inertia * 1.2,
            min_interval_minutes: response_minutes * 1.5,
            projection_threshold: inertia,
        };
        let learned = safety_bounds(&self.static_params, &raw);
        thermal.adaptive_deadband = Some(learned.deadband);
        thermal.adaptive_soft_error = Some(learned.soft_error);
        thermal.adaptive_hard_error = Some(learned.hard_error);
        thermal.adaptive_min_interval = Some(learned.min_interval_minutes);
        thermal.adaptive_projection_threshold = Some(learned.projection_threshold);
    }

    /// The mode learning would pick right now, if confident enough.
    ///
    /// Only modes with at least [`MIN_ACTIVATIONS_FOR_RECOMMENDATION`]
    /// activations are considered. Ties go to the earlier mode in
    /// `available`.
    pub fn recommended_fan_mode(&self, available: &[FanMode], error: f64) -> Option<FanMode> {
        if !self.enabled || self.confidence() <= CONFIDENCE_THRESHOLD_HIGH {
            return None;
        }

        let mut best: Option<(&FanMode, f64)> = None;
        for mode in available {
            let Some(profile) = self.state.profile(mode) else {
                continue;
            };
            if profile.activation_count < MIN_ACTIVATIONS_FOR_RECOMMENDATION {
                continue;
            }
            let mut score = profile.effectiveness_score;
            if error.abs() > LARGE_ERROR {
                score += profile.avg_slope_change.abs() * 0.2;
            }
            score -= profile.overshoot_rate() * 0.3;

            if best.map_or(true, |(_, s)| score > s) {
                best = Some((mode, score));
            }
        }

        best.map(|(mode, score)| {
            debug!(mode = %mode, score, confidence = self.confidence(), "Learned recommendation");
            mode.clone()
        })
    }

    /// Clear learned data within `scope`.
    ///
    /// Returns false when there was nothing to reset.
    pub fn reset(&mut self, scope: &ResetScope) -> bool {
        let changed = match scope {
            ResetScope::All => {
                self.state = LearningState::new();
                info!("Performed full learning reset");
                true
            }
            ResetScope::FanMode(mode) => {
                let removed = self.state.fan_mode_profiles.remove(mode).is_some();
                if removed {
                    info!(fan_mode = %mode, "Reset learning for fan mode");
                }
                removed
            }
        };
        if changed {
            self.dirty = true;
        }
        changed
    }

    /// Operator-facing snapshot.
    pub fn summary(&self) -> LearningSummary {
        let state = &self.state;
        LearningSummary {
            enabled: self.enabled,
            confidence: state.metadata.learning_confidence,
            total_decisions: state.metadata.total_decisions,
            successful_predictions: state.metadata.successful_predictions,
            thermal_inertia: state.thermal_parameters.learned_thermal_inertia,
            avg_response_time: state.thermal_parameters.avg_response_time,
            fan_modes: state
                .fan_mode_profiles
                .iter()
                .map(|(mode, profile)| {
                    (
                        mode.to_string(),
                        ModeSummary {
                            activations: profile.activation_count,
                            effectiveness: profile.effectiveness_score,
                            avg_slope_change: profile.avg_slope_change,
                            overshoots: profile.overshoot_events,
                            undershoots: profile.undershoot_events,
                        },
                    )
                })
                .collect(),
            active_parameters: self.adaptive_parameters(),
            last_saved: state.metadata.last_saved.clone(),
        }
    }
}

/// `0.5 × min(1, total / 100) + 0.5 × successful / max(1, total)`.
pub fn confidence(total_decisions: u64, successful_predictions: u64) -> f64 {
    let observation = (total_decisions as f64 / MIN_OBSERVATIONS as f64).min(1.0);
    let accuracy = successful_predictions.min(total_decisions) as f64
        / total_decisions.max(1) as f64;
    (0.5 * observation + 0.5 * accuracy).clamp(0.0, 1.0)
}

fn ema(rate: f64, sample: f64, previous: f64) -> f64 {
    rate * sample + (1.0 - rate) * previous
}

fn effectiveness(profile: &FanModeProfile) -> f64 {
    (profile.avg_slope_change.abs() / FULL_EFFECT_SLOPE_CHANGE).clamp(0.0, 1.0)
}

/// Whether the period confirmed what its opening zone set out to do.
///
/// Errors are signed towards the target (positive: below target when
/// heating).
fn zone_succeeded(zone: Zone, error_before: f64, error_after: f64, overshoot: bool) -> bool {
    let closer = error_after.abs() < error_before.abs();
    match zone {
        Zone::Emergency | Zone::Recovery | Zone::Maintenance => closer && !overshoot,
        Zone::OverTarget => closer,
        Zone::Braking => !overshoot,
        Zone::Stable => error_after.abs() <= error_before.abs().max(OVERSHOOT_THRESHOLD),
    }
}
