//! Acceleration estimate from successive slope samples.

/// Weight of the newest instantaneous acceleration in the low-pass filter.
const FILTER_WEIGHT: f64 = 0.3;

/// Low-pass filtered derivative of the thermal slope.
///
/// Slope readings from climate entities are noisy; differentiating them
/// directly makes the parabolic term of the forecast jump around. The
/// estimator smooths the instantaneous acceleration:
///
/// ```text
/// a = 0.3 × (Δslope / Δt) + 0.7 × a_prev
/// ```
///
/// Units follow the inputs: slope in °C/h with `dt` in hours yields °C/h².
#[derive(Debug, Clone, Default)]
pub struct AccelerationEstimator {
    previous_slope: Option<f64>,
    acceleration: f64,
}

impl AccelerationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a slope sample taken `dt` after the previous one and return the
    /// filtered acceleration.
    ///
    /// The first sample only primes the filter. Non-positive `dt` leaves the
    /// estimate unchanged. Non-finite slopes are ignored entirely.
    pub fn update(&mut self, slope: f64, dt: f64) -> f64 {
        if !slope.is_finite() {
            return self.acceleration;
        }
        if let Some(previous) = self.previous_slope {
            if dt > 0.0 && dt.is_finite() {
                let instantaneous = (slope - previous) / dt;
                self.acceleration =
                    FILTER_WEIGHT * instantaneous + (1.0 - FILTER_WEIGHT) * self.acceleration;
            }
        }
        self.previous_slope = Some(slope);
        self.acceleration
    }

    /// Current filtered acceleration.
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
