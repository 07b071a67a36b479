//! Controller inputs, state and per-cycle reports.

use std::time::Instant;

use crate::decision::{ControlParameters, Decision, HvacMode, Zone};
use crate::fan_mode::FanMode;
use crate::forecast::Forecast;
use crate::learning::ObservationOutcome;

/// One reading from the climate entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    /// When the sample was taken.
    pub at: Instant,
    /// Room temperature (°C); `None` when the sensor is unavailable.
    pub temperature: Option<f64>,
    /// Setpoint (°C).
    pub target: Option<f64>,
    /// Thermal slope (°C/h).
    pub slope_per_hour: f64,
    /// Thermal acceleration (°C/h²), if the feed provides one.
    pub acceleration_per_hour2: Option<f64>,
    /// Fan mode the entity reports.
    pub fan_mode: Option<FanMode>,
    pub hvac_mode: HvacMode,
}

impl SensorSample {
    /// A heating sample with no fan mode or acceleration.
    pub fn new(at: Instant, temperature: f64, target: f64, slope_per_hour: f64) -> Self {
        Self {
            at,
            temperature: Some(temperature),
            target: Some(target),
            slope_per_hour,
            acceleration_per_hour2: None,
            fan_mode: None,
            hvac_mode: HvacMode::Heat,
        }
    }

    pub fn with_fan_mode(mut self, mode: impl Into<FanMode>) -> Self {
        self.fan_mode = Some(mode.into());
        self
    }

    pub fn with_hvac_mode(mut self, mode: HvacMode) -> Self {
        self.hvac_mode = mode;
        self
    }
}

/// Start of the period the next learning observation covers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObservationAnchor {
    pub at: Instant,
    pub temperature: f64,
    pub slope_per_hour: f64,
    pub target: f64,
    /// Mode before the anchoring decision.
    pub fan_mode_before: FanMode,
    /// Mode the anchoring decision selected; it runs during the period.
    pub fan_mode_after: FanMode,
    pub zone: Zone,
    pub hvac_mode: HvacMode,
}

/// Everything the controller remembers between cycles.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<f64>,
    /// Slope (°C/h).
    pub slope: f64,
    /// Acceleration (°C/h²).
    pub acceleration: f64,
    pub fan_mode: Option<FanMode>,
    pub zone: Option<Zone>,
    pub hvac_mode: HvacMode,
    pub last_change_at: Option<Instant>,
    /// Slope the noise filter compares against.
    pub slope_snapshot: Option<f64>,
    pub slope_at_last_change: Option<f64>,
    pub last_sample_at: Option<Instant>,
    pub(crate) anchor: Option<ObservationAnchor>,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub decision: Decision,
    /// Mode to send to the entity; `None` when nothing changes.
    pub command: Option<FanMode>,
    /// Parameters the decision ran with.
    pub parameters: ControlParameters,
    pub forecast: Forecast,
    /// Learning outcome, when the cycle closed an observation period.
    pub observation: Option<ObservationOutcome>,
    /// What learning would pick, when confident enough.
    pub recommendation: Option<FanMode>,
}
