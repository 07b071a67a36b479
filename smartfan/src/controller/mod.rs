//! Per-entity control loop.
//!
//! A [`Controller`] runs one cycle per sensor sample:
//!
//! ```text
//! SensorSample
//!   ├─ acceleration (feed value or estimated from slope history)
//!   ├─ parameters = learning.adaptive_parameters()
//!   ├─ ThermalForecaster::predict over the prediction window
//!   ├─ DecisionEngine::decide
//!   ├─ learning.observe when the period is long enough or the mode changes
//!   └─ CycleReport (command when the mode changes)
//! ```
//!
//! The configuration is fixed for the controller's lifetime. To change it,
//! take the learning engine back with [`Controller::into_learning`] and build
//! a new controller.

mod state;

pub use state::{ControllerState, CycleReport, SensorSample};

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ControllerConfig;
use crate::decision::{Decision, DecisionEngine, DecisionInput, SLOPE_NOISE_THRESHOLD};
use crate::error::ControlError;
use crate::fan_mode::{FanMode, FanModeLadder};
use crate::forecast::{per_hour, per_hour_squared, AccelerationEstimator, ThermalForecaster};
use crate::learning::{AdaptiveLearningEngine, Observation, ObservationOutcome};
use state::ObservationAnchor;

/// Shortest period worth learning from, unless the fan mode changed.
pub const MIN_OBSERVATION_PERIOD: Duration = Duration::from_secs(120);

/// Control loop for one climate entity.
#[derive(Debug)]
pub struct Controller {
    entity_id: String,
    config: ControllerConfig,
    engine: DecisionEngine,
    learning: AdaptiveLearningEngine,
    acceleration: AccelerationEstimator,
    state: ControllerState,
}

impl Controller {
    /// Create a controller.
    ///
    /// `config` is sanitized; `learning` is reconfigured to match it.
    pub fn new(
        entity_id: impl Into<String>,
        config: ControllerConfig,
        ladder: FanModeLadder,
        mut learning: AdaptiveLearningEngine,
    ) -> Self {
        let (config, _) = config.sanitize();
        learning.reconfigure(&config);
        let entity_id = entity_id.into();

        info!(
            entity = %entity_id,
            fan_modes = ladder.len(),
            deadband = config.deadband,
            min_interval = config.min_interval_minutes,
            learning = config.enable_adaptive_learning,
            "Controller initialized"
        );

        Self {
            entity_id,
            engine: DecisionEngine::new(ladder, config.limit_timeout()),
            config,
            learning,
            acceleration: AccelerationEstimator::new(),
            state: ControllerState::default(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn ladder(&self) -> &FanModeLadder {
        self.engine.ladder()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn learning(&self) -> &AdaptiveLearningEngine {
        &self.learning
    }

    pub fn learning_mut(&mut self) -> &mut AdaptiveLearningEngine {
        &mut self.learning
    }

    /// Tear the controller down, keeping what it learned.
    pub fn into_learning(self) -> AdaptiveLearningEngine {
        self.learning
    }

    /// Run one decision cycle.
    ///
    /// # Errors
    ///
    /// [`ControlError::InvalidArgument`] for a non-finite slope or
    /// acceleration; nothing is updated. [`ControlError::InsufficientData`]
    /// when the sample lacks a temperature or target. Either way the previous
    /// fan mode is held and no learning happens.
    pub fn cycle(&mut self, sample: &SensorSample) -> Result<CycleReport, ControlError> {
        if !sample.slope_per_hour.is_finite() {
            return Err(ControlError::invalid("slope_per_hour", "must be finite"));
        }
        if sample.acceleration_per_hour2.is_some_and(|a| !a.is_finite()) {
            return Err(ControlError::invalid("acceleration_per_hour2", "must be finite"));
        }

        let dt_hours = self
            .state
            .last_sample_at
            .map(|last| sample.at.saturating_duration_since(last).as_secs_f64() / 3600.0)
            .unwrap_or(0.0);
        let estimated = self.acceleration.update(sample.slope_per_hour, dt_hours);
        let acceleration = sample.acceleration_per_hour2.unwrap_or(estimated);

        self.state.last_sample_at = Some(sample.at);
        self.state.current_temperature = sample.temperature;
        self.state.target_temperature = sample.target;
        self.state.slope = sample.slope_per_hour;
        self.state.acceleration = acceleration;
        self.state.hvac_mode = sample.hvac_mode;
        if let Some(mode) = &sample.fan_mode {
            self.state.fan_mode = Some(mode.clone());
        }
        if self.state.slope_snapshot.is_none() {
            self.state.slope_snapshot = Some(sample.slope_per_hour);
            self.state.slope_at_last_change = Some(sample.slope_per_hour);
        }

        let current = sample
            .temperature
            .filter(|t| t.is_finite())
            .ok_or(ControlError::InsufficientData("current temperature"))?;

        let parameters = self.learning.adaptive_parameters();
        let horizon_secs = self
            .learning
            .state()
            .thermal_parameters
            .optimal_prediction_window
            * 60.0;
        let forecast = ThermalForecaster::predict(
            current,
            per_hour(sample.slope_per_hour),
            per_hour_squared(acceleration),
            horizon_secs,
        )?;

        let current_mode = self.state.fan_mode.clone();
        let input = DecisionInput {
            current_temperature: Some(current),
            target_temperature: sample.target,
            forecast_delta: forecast.delta_from(current),
            slope_per_hour: sample.slope_per_hour,
            slope_reference: self.state.slope_snapshot,
            slope_at_last_change: self.state.slope_at_last_change,
            current_fan_mode: current_mode.as_ref(),
            hvac_mode: sample.hvac_mode,
            time_since_last_change: self
                .state
                .last_change_at
                .map(|t| sample.at.saturating_duration_since(t)),
        };
        let decision = self.engine.decide(&input, &parameters)?;

        // Decide returned Ok, so the target is present and finite.
        let target = sample.target.unwrap_or(current);
        let current_mode = self
            .ladder()
            .mode_at(self.ladder().index_or_lowest(current_mode.as_ref()))
            .clone();
        let observation = self.learn(sample, current, target, &current_mode, &decision);

        let slope_moved = self
            .state
            .slope_snapshot
            .map_or(true, |s| (sample.slope_per_hour - s).abs() >= SLOPE_NOISE_THRESHOLD);
        if decision.changed {
            self.state.last_change_at = Some(sample.at);
            self.state.slope_at_last_change = Some(sample.slope_per_hour);
            info!(
                entity = %self.entity_id,
                from = %current_mode,
                to = %decision.fan_mode,
                zone = %decision.zone,
                reason = %decision.reason,
                "Fan mode change"
            );
        }
        if decision.changed || slope_moved {
            self.state.slope_snapshot = Some(sample.slope_per_hour);
        }
        self.state.zone = Some(decision.zone);
        self.state.fan_mode = Some(decision.fan_mode.clone());

        let recommendation = self
            .learning
            .recommended_fan_mode(self.ladder().modes(), decision.error);

        Ok(CycleReport {
            command: decision.changed.then(|| decision.fan_mode.clone()),
            decision,
            parameters,
            forecast,
            observation,
            recommendation,
        })
    }

    /// Close the running observation period if due, and open the next one.
    fn learn(
        &mut self,
        sample: &SensorSample,
        current: f64,
        target: f64,
        current_mode: &FanMode,
        decision: &Decision,
    ) -> Option<ObservationOutcome> {
        if !self.learning.is_enabled() {
            self.state.anchor = None;
            return None;
        }

        let mut outcome = None;
        let due = match &self.state.anchor {
            Some(anchor) => {
                let elapsed = sample.at.saturating_duration_since(anchor.at);
                elapsed >= MIN_OBSERVATION_PERIOD || (decision.changed && !elapsed.is_zero())
            }
            None => true,
        };
        if !due {
            return None;
        }

        if let Some(anchor) = self.state.anchor.take() {
            let observation = Observation {
                fan_mode_before: anchor.fan_mode_before,
                fan_mode_after: anchor.fan_mode_after,
                temp_before: anchor.temperature,
                temp_after: current,
                elapsed: sample.at.saturating_duration_since(anchor.at),
                slope_before: anchor.slope_per_hour,
                slope_after: sample.slope_per_hour,
                target: anchor.target,
                zone: anchor.zone,
                hvac_mode: anchor.hvac_mode,
            };
            outcome = self.learning.observe(&observation);
        }

        self.state.anchor = Some(ObservationAnchor {
            at: sample.at,
            temperature: current,
            slope_per_hour: sample.slope_per_hour,
            target,
            fan_mode_before: current_mode.clone(),
            fan_mode_after: decision.fan_mode.clone(),
            zone: decision.zone,
            hvac_mode: sample.hvac_mode,
        });
        outcome
    }

    /// Record a fan-mode change made outside the controller.
    ///
    /// Restarts the anti-cycling timer so the controller does not fight the
    /// user, and drops the running observation period.
    pub fn on_manual_fan_change(&mut self, mode: FanMode, at: Instant) {
        debug!(entity = %self.entity_id, fan_mode = %mode, "Manual fan mode change");
        self.state.fan_mode = Some(mode);
        self.state.last_change_at = Some(at);
        self.state.slope_at_last_change = Some(self.state.slope);
        self.state.anchor = None;
    }
}
