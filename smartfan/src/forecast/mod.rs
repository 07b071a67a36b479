//! Short-horizon thermal forecasting.
//!
//! The forecaster extrapolates temperature with a second-order (parabolic)
//! model:
//!
//! ```text
//! predicted_delta = slope × t + ½ × acceleration × t²
//! ```
//!
//! All rates are per second and `t` is in seconds. Climate sensors usually
//! report slope in °C/h; use [`per_hour`] and [`per_hour_squared`] to
//! convert before forecasting.
//!
//! When the sensor feed does not provide acceleration, the
//! [`AccelerationEstimator`] derives it from successive slope samples.

mod acceleration;

pub use acceleration::AccelerationEstimator;

use crate::error::ControlError;

/// Longest horizon the parabolic model is trusted for (10 minutes).
pub const MAX_HORIZON_SECS: f64 = 600.0;

const SECS_PER_HOUR: f64 = 3600.0;

/// Convert a rate in units per hour to units per second.
pub fn per_hour(rate_per_hour: f64) -> f64 {
    rate_per_hour / SECS_PER_HOUR
}

/// Convert an acceleration in units per hour² to units per second².
pub fn per_hour_squared(accel_per_hour2: f64) -> f64 {
    accel_per_hour2 / (SECS_PER_HOUR * SECS_PER_HOUR)
}

/// Predicted temperature at the end of a horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    /// Temperature expected at the end of the horizon.
    pub predicted_temperature: f64,
    /// Horizon actually used, after clamping.
    pub horizon_seconds: f64,
}

impl Forecast {
    /// Predicted change relative to `current_temperature`.
    pub fn delta_from(&self, current_temperature: f64) -> f64 {
        self.predicted_temperature - current_temperature
    }
}

/// Stateless parabolic forecaster.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThermalForecaster;

impl ThermalForecaster {
    /// Predicted temperature change after `horizon_secs`.
    ///
    /// The horizon is clamped to [`MAX_HORIZON_SECS`]. Negative or
    /// non-finite horizons are rejected.
    pub fn forecast(slope: f64, acceleration: f64, horizon_secs: f64) -> Result<f64, ControlError> {
        let horizon = Self::clamp_horizon(horizon_secs)?;
        Ok(slope * horizon + 0.5 * acceleration * horizon * horizon)
    }

    /// Predicted temperature, starting from `current_temperature`.
    pub fn predict(
        current_temperature: f64,
        slope: f64,
        acceleration: f64,
        horizon_secs: f64,
    ) -> Result<Forecast, ControlError> {
        let horizon = Self::clamp_horizon(horizon_secs)?;
        let delta = Self::forecast(slope, acceleration, horizon)?;
        Ok(Forecast {
            predicted_temperature: current_temperature + delta,
            horizon_seconds: horizon,
        })
    }

    fn clamp_horizon(horizon_secs: f64) -> Result<f64, ControlError> {
        if !horizon_secs.is_finite() {
            return Err(ControlError::invalid("horizon", "must be finite"));
        }
        if horizon_secs < 0.0 {
            return Err(ControlError::invalid(
                "horizon",
                format!("must not be negative (got {horizon_secs})"),
            ));
        }
        Ok(horizon_secs.min(MAX_HORIZON_SECS))
    }
}
