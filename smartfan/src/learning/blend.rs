//! Confidence-weighted blending of static and learned parameters.
//!
//! One continuous function with three regimes:
//!
//! ```text
//! confidence < 0.3          static
//! 0.3 ≤ confidence ≤ 0.7    static × (1 - w) + learned × w,  w = (c - 0.3) / 0.4
//! confidence > 0.7          learned
//! ```
//!
//! Learned values are pulled inside safety bounds before blending, so the
//! result never leaves them either.

use crate::decision::ControlParameters;

/// Below this confidence the static parameters are used unchanged.
pub const CONFIDENCE_THRESHOLD_LOW: f64 = 0.3;

/// Above this confidence the learned parameters are used unchanged.
pub const CONFIDENCE_THRESHOLD_HIGH: f64 = 0.7;

/// Learned values may not go below this fraction of their static value.
const MIN_STATIC_FACTOR: f64 = 0.5;

/// Learned values may not exceed this multiple of their static value.
const MAX_STATIC_FACTOR: f64 = 2.0;

/// Range of a learned minimum interval (minutes).
pub const LEARNED_MIN_INTERVAL_RANGE: (f64, f64) = (5.0, 20.0);

/// Weight of the learned parameters at `confidence`, in [0, 1].
pub fn blend_weight(confidence: f64) -> f64 {
    if !confidence.is_finite() {
        return 0.0;
    }
    ((confidence - CONFIDENCE_THRESHOLD_LOW)
        / (CONFIDENCE_THRESHOLD_HIGH - CONFIDENCE_THRESHOLD_LOW))
        .clamp(0.0, 1.0)
}

/// Pull `learned` into the safe region around `static_params`.
///
/// Each threshold stays within [0.5×, 2×] of its static value, then the
/// ordering `hard_error ≥ soft_error ≥ deadband` is restored by raising the
/// larger threshold. The minimum interval is additionally kept within
/// [`LEARNED_MIN_INTERVAL_RANGE`].
pub fn safety_bounds(
    static_params: &ControlParameters,
    learned: &ControlParameters,
) -> ControlParameters {
    let deadband = bound(learned.deadband, static_params.deadband);
    let soft_error = bound(learned.soft_error, static_params.soft_error).max(deadband);
    let hard_error = bound(learned.hard_error, static_params.hard_error).max(soft_error);
    let (min_lo, min_hi) = LEARNED_MIN_INTERVAL_RANGE;
    let min_interval_minutes = bound(
        learned.min_interval_minutes,
        static_params.min_interval_minutes,
    )
    .clamp(min_lo, min_hi);
    let projection_threshold = bound(
        learned.projection_threshold,
        static_params.projection_threshold,
    );

    ControlParameters {
        deadband,
        soft_error,
        hard_error,
        min_interval_minutes,
        projection_threshold,
    }
}

/// Parameters for one cycle.
///
/// Pure: `learned` is bounded into a copy, never modified.
pub fn blend(
    static_params: &ControlParameters,
    learned: &ControlParameters,
    confidence: f64,
) -> ControlParameters {
    let w = blend_weight(confidence);
    if w == 0.0 {
        return *static_params;
    }
    let learned = safety_bounds(static_params, learned);
    if w == 1.0 {
        return learned;
    }

    let mix = |s: f64, l: f64| s * (1.0 - w) + l * w;
    ControlParameters {
        deadband: mix(static_params.deadband, learned.deadband),
        soft_error: mix(static_params.soft_error, learned.soft_error),
        hard_error: mix(static_params.hard_error, learned.hard_error),
        min_interval_minutes: mix(
            static_params.min_interval_minutes,
            learned.min_interval_minutes,
        ),
        projection_threshold: mix(
            static_params.projection_threshold,
            learned.projection_threshold,
        ),
    }
}

fn bound(learned: f64, static_value: f64) -> f64 {
    let lo = static_value * MIN_STATIC_FACTOR;
    let hi = static_value * MAX_STATIC_FACTOR;
    if learned.is_finite() {
        learned.clamp(lo, hi)
    } else {
        static_value
    }
}
