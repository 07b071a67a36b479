//! The six-zone decision engine.

use std::time::Duration;

use tracing::debug;

use super::{ControlParameters, HvacMode, Zone};
use crate::error::ControlError;
use crate::fan_mode::{FanMode, FanModeLadder};

/// Slope changes smaller than this are sensor noise (°C/h).
pub const SLOPE_NOISE_THRESHOLD: f64 = 0.1;

/// Everything one decision cycle looks at.
///
/// Temperatures are optional because sensors drop out; a missing value makes
/// the cycle fail with [`ControlError::InsufficientData`].
#[derive(Debug, Clone, Default)]
pub struct DecisionInput<'a> {
    /// Measured room temperature (°C).
    pub current_temperature: Option<f64>,
    /// Setpoint (°C).
    pub target_temperature: Option<f64>,
    /// Forecast temperature change over the horizon (°C).
    pub forecast_delta: f64,
    /// Current thermal slope (°C/h).
    pub slope_per_hour: f64,
    /// Slope recorded at the previous evaluation, for the noise filter.
    pub slope_reference: Option<f64>,
    /// Slope recorded when the fan mode last changed.
    pub slope_at_last_change: Option<f64>,
    /// Mode the fan is in now. Unknown modes count as the slowest.
    pub current_fan_mode: Option<&'a FanMode>,
    /// Whether the unit is heating or cooling.
    pub hvac_mode: HvacMode,
    /// Time since the last fan-mode change; `None` if there never was one.
    pub time_since_last_change: Option<Duration>,
}

/// Why a proposed change was not applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Suppression {
    /// The minimum interval since the last change has not elapsed.
    MinInterval { remaining: Duration },
    /// The slope has not changed enough since the last snapshot.
    InsignificantSlope { slope_change: f64 },
}

impl std::fmt::Display for Suppression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Suppression::MinInterval { remaining } => {
                write!(f, "min interval, {}s remaining", remaining.as_secs())
            }
            Suppression::InsignificantSlope { slope_change } => {
                write!(f, "slope change {:.3}°C/h below noise threshold", slope_change)
            }
        }
    }
}

/// Outcome of one decision cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Mode the fan should be in.
    pub fan_mode: FanMode,
    /// Ladder position of `fan_mode`.
    pub fan_index: usize,
    /// Classified zone.
    pub zone: Zone,
    /// Whether `fan_mode` differs from the current mode.
    pub changed: bool,
    /// Set when the zone wanted a change that anti-cycling held back.
    pub suppressed: Option<Suppression>,
    /// Human-readable explanation.
    pub reason: String,
    /// Signed error (positive: more output needed).
    pub error: f64,
    /// Temperature expected at the end of the forecast horizon.
    pub projected_temperature: f64,
    /// Signed error at the end of the forecast horizon.
    pub projected_error: f64,
}

struct Classification {
    zone: Zone,
    index: usize,
    reason: String,
}

/// Classifies cycles into zones and picks the next fan mode.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    ladder: FanModeLadder,
    limit_timeout: Duration,
}

impl DecisionEngine {
    /// Create an engine for `ladder`.
    ///
    /// `limit_timeout` releases the slope-noise filter once that long has
    /// passed since the last change.
    pub fn new(ladder: FanModeLadder, limit_timeout: Duration) -> Self {
        Self {
            ladder,
            limit_timeout,
        }
    }

    pub fn ladder(&self) -> &FanModeLadder {
        &self.ladder
    }

    /// Decide the fan mode for one cycle.
    ///
    /// # Errors
    ///
    /// [`ControlError::InsufficientData`] when a temperature is missing or
    /// not finite, [`ControlError::InvalidArgument`] for a non-finite
    /// forecast or slope. The caller holds the previous mode in both cases.
    pub fn decide(
        &self,
        input: &DecisionInput<'_>,
        params: &ControlParameters,
    ) -> Result<Decision, ControlError> {
        let current = input
            .current_temperature
            .filter(|t| t.is_finite())
            .ok_or(ControlError::InsufficientData("current temperature"))?;
        let target = input
            .target_temperature
            .filter(|t| t.is_finite())
            .ok_or(ControlError::InsufficientData("target temperature"))?;
        if !input.forecast_delta.is_finite() {
            return Err(ControlError::invalid("forecast_delta", "must be finite"));
        }
        if !input.slope_per_hour.is_finite() {
            return Err(ControlError::invalid("slope", "must be finite"));
        }

        let hvac = input.hvac_mode;
        let error = hvac.signed_error(current, target);
        let projected_temperature = current + input.forecast_delta;
        let projected_error = hvac.signed_error(projected_temperature, target);
        let current_index = self.ladder.index_or_lowest(input.current_fan_mode);

        let classification = self.classify(
            input,
            params,
            current - target,
            error,
            projected_error,
            current_index,
        );

        let suppressed = if classification.index != current_index
            && !classification.zone.bypasses_anti_cycling()
        {
            self.anti_cycling(input, params)
        } else {
            None
        };

        let fan_index = if suppressed.is_some() {
            current_index
        } else {
            classification.index
        };

        let reason = match &suppressed {
            Some(s) => format!("{} (held: {})", classification.reason, s),
            None => classification.reason,
        };

        debug!(
            zone = %classification.zone,
            error,
            projected_error,
            from = current_index,
            to = fan_index,
            suppressed = suppressed.is_some(),
            "Decision"
        );

        Ok(Decision {
            fan_mode: self.ladder.mode_at(fan_index).clone(),
            fan_index,
            zone: classification.zone,
            changed: fan_index != current_index,
            suppressed,
            reason,
            error,
            projected_temperature,
            projected_error,
        })
    }

    /// Zone selection. Total over finite input; the first matching zone wins.
    fn classify(
        &self,
        input: &DecisionInput<'_>,
        params: &ControlParameters,
        deviation: f64,
        error: f64,
        projected_error: f64,
        current_index: usize,
    ) -> Classification {
        let hvac = input.hvac_mode;
        let slope = hvac.directed(input.slope_per_hour);
        let slope_negligible = slope.abs() < SLOPE_NOISE_THRESHOLD;

        if deviation.abs() > params.hard_error {
            return Classification {
                zone: Zone::Emergency,
                index: self.ladder.max_index(),
                reason: format!(
                    "error {:.2}°C exceeds hard limit {:.2}°C",
                    deviation.abs(),
                    params.hard_error
                ),
            };
        }

        if projected_error < -params.deadband && error >= -params.deadband {
            return Classification {
                zone: Zone::Braking,
                index: self.ladder.step_down(current_index),
                reason: format!(
                    "projected overshoot {:.2}°C beyond deadband",
                    -projected_error
                ),
            };
        }

        if error > params.soft_error {
            let improving = input
                .slope_at_last_change
                .map(|s| slope > hvac.directed(s) + SLOPE_NOISE_THRESHOLD)
                .unwrap_or(false);
            return if improving {
                Classification {
                    zone: Zone::Recovery,
                    index: current_index,
                    reason: format!("error {:.2}°C, slope improving, holding", error),
                }
            } else {
                Classification {
                    zone: Zone::Recovery,
                    index: self.ladder.step_up(current_index),
                    reason: format!(
                        "error {:.2}°C above soft limit {:.2}°C",
                        error, params.soft_error
                    ),
                }
            };
        }

        if error > 0.0 && (error >= params.deadband || !slope_negligible) {
            let drifting_away = slope < -SLOPE_NOISE_THRESHOLD;
            let projected_miss = projected_error > params.projection_threshold;
            return if drifting_away || projected_miss {
                Classification {
                    zone: Zone::Maintenance,
                    index: self.ladder.step_up(current_index),
                    reason: if drifting_away {
                        format!("drifting away at {:.2}°C/h", -slope)
                    } else {
                        format!("projected error {:.2}°C", projected_error)
                    },
                }
            } else {
                Classification {
                    zone: Zone::Maintenance,
                    index: current_index,
                    reason: format!("error {:.2}°C within comfort band", error),
                }
            };
        }

        if error < -params.deadband {
            return Classification {
                zone: Zone::OverTarget,
                index: self.ladder.step_down(current_index),
                reason: format!("target exceeded by {:.2}°C", -error),
            };
        }

        Classification {
            zone: Zone::Stable,
            index: current_index,
            reason: format!("error {:.2}°C within deadband", error),
        }
    }

    fn anti_cycling(
        &self,
        input: &DecisionInput<'_>,
        params: &ControlParameters,
    ) -> Option<Suppression> {
        let elapsed = input.time_since_last_change?;

        let min_interval = params.min_interval();
        if elapsed < min_interval {
            return Some(Suppression::MinInterval {
                remaining: min_interval - elapsed,
            });
        }

        if elapsed >= self.limit_timeout {
            return None;
        }

        let slope_change = input
            .slope_reference
            .map(|r| (input.slope_per_hour - r).abs())?;
        if slope_change < SLOPE_NOISE_THRESHOLD {
            return Some(Suppression::InsignificantSlope { slope_change });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn engine() -> DecisionEngine {
        let ladder = FanModeLadder::new(["low", "medium", "high", "turbo"]).unwrap();
        DecisionEngine::new(ladder, 15 * MINUTE)
    }

    fn params() -> ControlParameters {
        ControlParameters {
            deadband: 0.2,
            soft_error: 0.3,
            hard_error: 0.6,
            min_interval_minutes: 10.0,
            projection_threshold: 0.5,
        }
    }

    fn input<'a>(current: f64, target: f64, mode: &'a FanMode) -> DecisionInput<'a> {
        DecisionInput {
            current_temperature: Some(current),
            target_temperature: Some(target),
            current_fan_mode: Some(mode),
            ..Default::default()
        }
    }

    #[test]
    fn test_emergency_ignores_recent_change() {
        let mode = FanMode::from("low");
        let input = DecisionInput {
            time_since_last_change: Some(Duration::ZERO),
            ..input(19.0, 20.0, &mode)
        };
        let decision = engine().decide(&input, &params()).unwrap();
        assert_eq!(decision.zone, Zone::Emergency);
        assert_eq!(decision.fan_mode.as_str(), "turbo");
        assert!(decision.changed);
        assert!(decision.suppressed.is_none());
    }

    #[test]
    fn test_within_deadband_is_stable() {
        let mode = FanMode::from("medium");
        let decision = engine().decide(&input(20.1, 20.0, &mode), &params()).unwrap();
        assert_eq!(decision.zone, Zone::Stable);
        assert_eq!(decision.fan_mode, mode);
        assert!(!decision.changed);
    }

    #[test]
    fn test_missing_temperature_is_insufficient_data() {
        let mode = FanMode::from("low");
        let input = DecisionInput {
            target_temperature: None,
            ..input(19.0, 20.0, &mode)
        };
        assert_eq!(
            engine().decide(&input, &params()),
            Err(ControlError::InsufficientData("target temperature"))
        );
    }

    #[test]
    fn test_recovery_steps_up_one_level() {
        let mode = FanMode::from("low");
        let decision = engine().decide(&input(19.55, 20.0, &mode), &params()).unwrap();
        assert_eq!(decision.zone, Zone::Recovery);
        assert_eq!(decision.fan_mode.as_str(), "medium");
    }

    #[test]
    fn test_recovery_holds_while_slope_improves() {
        let mode = FanMode::from("medium");
        let input = DecisionInput {
            slope_per_hour: 0.8,
            slope_at_last_change: Some(0.2),
            ..input(19.55, 20.0, &mode)
        };
        let decision = engine().decide(&input, &params()).unwrap();
        assert_eq!(decision.zone, Zone::Recovery);
        assert!(!decision.changed);
    }

    #[test]
    fn test_braking_before_overshoot() {
        let mode = FanMode::from("high");
        let input = DecisionInput {
            forecast_delta: 0.4,
            slope_per_hour: 2.4,
            ..input(19.9, 20.0, &mode)
        };
        let decision = engine().decide(&input, &params()).unwrap();
        assert_eq!(decision.zone, Zone::Braking);
        assert_eq!(decision.fan_mode.as_str(), "medium");
        assert!((decision.projected_temperature - 20.3).abs() < 1e-9);
    }

    #[test]
    fn test_over_target_steps_down() {
        let mode = FanMode::from("high");
        let decision = engine().decide(&input(20.4, 20.0, &mode), &params()).unwrap();
        assert_eq!(decision.zone, Zone::OverTarget);
        assert_eq!(decision.fan_mode.as_str(), "medium");
    }

    #[test]
    fn test_maintenance_holds_or_micro_adjusts() {
        let mode = FanMode::from("medium");
        let steady = engine().decide(&input(19.75, 20.0, &mode), &params()).unwrap();
        assert_eq!(steady.zone, Zone::Maintenance);
        assert!(!steady.changed);

        let drifting = DecisionInput {
            slope_per_hour: -0.3,
            ..input(19.75, 20.0, &mode)
        };
        let decision = engine().decide(&drifting, &params()).unwrap();
        assert_eq!(decision.zone, Zone::Maintenance);
        assert_eq!(decision.fan_mode.as_str(), "high");
    }

    #[test]
    fn test_cooling_flips_direction() {
        let mode = FanMode::from("low");
        let input = DecisionInput {
            hvac_mode: HvacMode::Cool,
            ..input(24.45, 24.0, &mode)
        };
        let decision = engine().decide(&input, &params()).unwrap();
        assert_eq!(decision.zone, Zone::Recovery);
        assert!(decision.error > 0.0);
        assert_eq!(decision.fan_mode.as_str(), "medium");
    }

    #[test]
    fn test_min_interval_suppresses_change() {
        let mode = FanMode::from("low");
        let input = DecisionInput {
            time_since_last_change: Some(5 * MINUTE),
            ..input(19.55, 20.0, &mode)
        };
        let decision = engine().decide(&input, &params()).unwrap();
        assert_eq!(decision.zone, Zone::Recovery);
        assert!(!decision.changed);
        assert_eq!(
            decision.suppressed,
            Some(Suppression::MinInterval {
                remaining: 5 * MINUTE
            })
        );
    }

    #[test]
    fn test_flat_slope_held_until_limit_timeout() {
        let mode = FanMode::from("low");
        let held = DecisionInput {
            time_since_last_change: Some(12 * MINUTE),
            slope_per_hour: 0.05,
            slope_reference: Some(0.0),
            ..input(19.55, 20.0, &mode)
        };
        let decision = engine().decide(&held, &params()).unwrap();
        assert!(matches!(
            decision.suppressed,
            Some(Suppression::InsignificantSlope { .. })
        ));

        let released = DecisionInput {
            time_since_last_change: Some(15 * MINUTE),
            ..held
        };
        let decision = engine().decide(&released, &params()).unwrap();
        assert!(decision.changed);
        assert_eq!(decision.fan_mode.as_str(), "medium");
    }

    #[test]
    fn test_unknown_mode_counts_as_lowest() {
        let mode = FanMode::from("unknown_mode");
        let decision = engine().decide(&input(19.55, 20.0, &mode), &params()).unwrap();
        assert_eq!(decision.fan_mode.as_str(), "medium");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn hvac() -> impl Strategy<Value = HvacMode> {
            prop_oneof![Just(HvacMode::Heat), Just(HvacMode::Cool)]
        }

        proptest! {
            #[test]
            fn test_emergency_always_wins(
                current in 10.0..30.0_f64,
                forecast in -3.0..3.0_f64,
                slope in -5.0..5.0_f64,
                mode_index in 0usize..4,
                minutes in 0u64..60,
                hvac in hvac()
            ) {
                let engine = engine();
                let mode = engine.ladder().mode_at(mode_index).clone();
                let input = DecisionInput {
                    forecast_delta: forecast,
                    slope_per_hour: slope,
                    slope_reference: Some(slope),
                    time_since_last_change: Some(Duration::from_secs(minutes * 60)),
                    hvac_mode: hvac,
                    ..input(current, 20.0, &mode)
                };
                let decision = engine.decide(&input, &params())?;
                if (current - 20.0).abs() > params().hard_error {
                    prop_assert_eq!(decision.zone, Zone::Emergency);
                    prop_assert_eq!(decision.fan_mode.as_str(), "turbo");
                } else {
                    prop_assert_ne!(decision.zone, Zone::Emergency);
                }
            }

            #[test]
            fn test_changes_never_exceed_one_step(
                current in 19.41..20.59_f64,
                forecast in -3.0..3.0_f64,
                slope in -5.0..5.0_f64,
                mode_index in 0usize..4,
                hvac in hvac()
            ) {
                let engine = engine();
                let mode = engine.ladder().mode_at(mode_index).clone();
                let input = DecisionInput {
                    forecast_delta: forecast,
                    slope_per_hour: slope,
                    hvac_mode: hvac,
                    ..input(current, 20.0, &mode)
                };
                let decision = engine.decide(&input, &params())?;
                prop_assert!(decision.fan_index.abs_diff(mode_index) <= 1);
            }

            #[test]
            fn test_anti_cycling_holds_mode(
                current in 19.41..20.59_f64,
                forecast in -3.0..3.0_f64,
                slope in -5.0..5.0_f64,
                mode_index in 0usize..4,
                seconds in 0u64..600,
                hvac in hvac()
            ) {
                let engine = engine();
                let mode = engine.ladder().mode_at(mode_index).clone();
                let input = DecisionInput {
                    forecast_delta: forecast,
                    slope_per_hour: slope,
                    time_since_last_change: Some(Duration::from_secs(seconds)),
                    hvac_mode: hvac,
                    ..input(current, 20.0, &mode)
                };
                let decision = engine.decide(&input, &params())?;
                prop_assert!(!decision.changed);
                prop_assert_eq!(decision.fan_mode, mode);
            }
        }
    }
}
