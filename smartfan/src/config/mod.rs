//! Controller configuration.
//!
//! [`ControllerConfig`] is the static parameter set of one controller. It is
//! immutable for the lifetime of a [`Controller`](crate::controller::Controller);
//! changing it rebuilds the controller while the learning state survives.
//!
//! Range validation belongs to whoever edits the configuration, but values
//! reaching the core are still clamped by [`ControllerConfig::sanitize`],
//! which reports every adjustment as a [`ConfigWarning`].
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [controller]
//! deadband = 0.2
//! min_interval = 10
//! soft_error = 0.3
//! hard_error = 0.6
//! projected_error_threshold = 0.5
//! limit_timeout = 15
//!
//! [learning]
//! enabled = true
//! learning_rate = 0.1
//! save_interval = 60
//! save_every_decisions = 0
//!
//! [entity:climate.living_room]
//! fan_modes = low, medium, high, turbo
//! deadband = 0.3
//! ```

mod file;

pub use file::{config_file_path, default_storage_dir, ConfigError, ConfigFile, EntitySettings};

use std::fmt;
use std::time::Duration;

use crate::decision::ControlParameters;

/// Default tolerance band around the target (°C).
pub const DEFAULT_DEADBAND: f64 = 0.2;
/// Default minimum time between fan-mode changes (minutes).
pub const DEFAULT_MIN_INTERVAL_MINUTES: f64 = 10.0;
/// Default corrective-response error threshold (°C).
pub const DEFAULT_SOFT_ERROR: f64 = 0.3;
/// Default emergency error threshold (°C).
pub const DEFAULT_HARD_ERROR: f64 = 0.6;
/// Default projected-error threshold for predictive boosting (°C).
pub const DEFAULT_PROJECTED_ERROR_THRESHOLD: f64 = 0.5;
/// Default time after which the slope-noise filter releases a held mode (minutes).
pub const DEFAULT_LIMIT_TIMEOUT_MINUTES: f64 = 15.0;
/// Default EMA learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
/// Default periodic save interval (minutes).
pub const DEFAULT_SAVE_INTERVAL_MINUTES: f64 = 60.0;

const DEADBAND_RANGE: (f64, f64) = (0.0, 5.0);
const MIN_INTERVAL_RANGE: (f64, f64) = (1.0, 60.0);
const ERROR_RANGE: (f64, f64) = (0.0, 10.0);
const LIMIT_TIMEOUT_RANGE: (f64, f64) = (10.0, 120.0);
/// Allowed EMA learning rate range.
pub const LEARNING_RATE_RANGE: (f64, f64) = (0.05, 0.2);
const SAVE_INTERVAL_RANGE: (f64, f64) = (1.0, 24.0 * 60.0);

/// A configuration value that had to be adjusted.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    /// Value outside its valid range, clamped to the nearest bound.
    OutOfRange {
        key: &'static str,
        value: f64,
        clamped: f64,
    },
    /// Value could not be parsed; the default was kept.
    Unparseable { key: String, value: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::OutOfRange {
                key,
                value,
                clamped,
            } => write!(f, "{} = {} is out of range, using {}", key, value, clamped),
            ConfigWarning::Unparseable { key, value } => {
                write!(f, "{} = '{}' could not be parsed, using default", key, value)
            }
        }
    }
}

/// Static configuration of one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Tolerance band around the target considered "on target" (°C).
    pub deadband: f64,

    /// Minimum time between two fan-mode changes (minutes).
    pub min_interval_minutes: f64,

    /// Error above which the controller actively recovers (°C).
    pub soft_error: f64,

    /// Error above which the controller jumps to maximum speed (°C).
    pub hard_error: f64,

    /// Projected error that triggers a predictive boost (°C).
    pub projected_error_threshold: f64,

    /// After this long without a change the slope-noise filter no longer
    /// holds the current mode (minutes).
    pub limit_timeout_minutes: f64,

    /// Whether outcomes are learned and blended into the parameters.
    pub enable_adaptive_learning: bool,

    /// EMA learning rate, within [`LEARNING_RATE_RANGE`].
    pub learning_rate: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            deadband: DEFAULT_DEADBAND,
            min_interval_minutes: DEFAULT_MIN_INTERVAL_MINUTES,
            soft_error: DEFAULT_SOFT_ERROR,
            hard_error: DEFAULT_HARD_ERROR,
            projected_error_threshold: DEFAULT_PROJECTED_ERROR_THRESHOLD,
            limit_timeout_minutes: DEFAULT_LIMIT_TIMEOUT_MINUTES,
            enable_adaptive_learning: true,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl ControllerConfig {
    /// Clamp every value into its valid range.
    ///
    /// Also enforces `hard_error ≥ soft_error ≥ deadband`, raising the larger
    /// threshold when the ordering is violated. Each adjustment is returned
    /// and logged at warn level.
    pub fn sanitize(mut self) -> (Self, Vec<ConfigWarning>) {
        let defaults = Self::default();
        let mut warnings = Vec::new();

        self.deadband = clamp_value(
            "deadband",
            self.deadband,
            defaults.deadband,
            DEADBAND_RANGE,
            &mut warnings,
        );
        self.min_interval_minutes = clamp_value(
            "min_interval",
            self.min_interval_minutes,
            defaults.min_interval_minutes,
            MIN_INTERVAL_RANGE,
            &mut warnings,
        );
        self.soft_error = clamp_value(
            "soft_error",
            self.soft_error,
            defaults.soft_error,
            ERROR_RANGE,
            &mut warnings,
        );
        self.hard_error = clamp_value(
            "hard_error",
            self.hard_error,
            defaults.hard_error,
            ERROR_RANGE,
            &mut warnings,
        );
        self.projected_error_threshold = clamp_value(
            "projected_error_threshold",
            self.projected_error_threshold,
            defaults.projected_error_threshold,
            ERROR_RANGE,
            &mut warnings,
        );
        self.limit_timeout_minutes = clamp_value(
            "limit_timeout",
            self.limit_timeout_minutes,
            defaults.limit_timeout_minutes,
            LIMIT_TIMEOUT_RANGE,
            &mut warnings,
        );
        self.learning_rate = clamp_value(
            "learning_rate",
            self.learning_rate,
            defaults.learning_rate,
            LEARNING_RATE_RANGE,
            &mut warnings,
        );

        if self.soft_error < self.deadband {
            warnings.push(ConfigWarning::OutOfRange {
                key: "soft_error",
                value: self.soft_error,
                clamped: self.deadband,
            });
            self.soft_error = self.deadband;
        }
        if self.hard_error < self.soft_error {
            warnings.push(ConfigWarning::OutOfRange {
                key: "hard_error",
                value: self.hard_error,
                clamped: self.soft_error,
            });
            self.hard_error = self.soft_error;
        }

        for warning in &warnings {
            tracing::warn!(%warning, "Controller configuration adjusted");
        }

        (self, warnings)
    }

    /// The static control parameters derived from this configuration.
    pub fn static_parameters(&self) -> ControlParameters {
        ControlParameters {
            deadband: self.deadband,
            soft_error: self.soft_error,
            hard_error: self.hard_error,
            min_interval_minutes: self.min_interval_minutes,
            projection_threshold: self.projected_error_threshold,
        }
    }

    /// A copy of this configuration with the control parameters replaced.
    ///
    /// Used when learned parameters are promoted to static defaults.
    pub fn with_parameters(&self, params: &ControlParameters) -> Self {
        Self {
            deadband: params.deadband,
            soft_error: params.soft_error,
            hard_error: params.hard_error,
            min_interval_minutes: params.min_interval_minutes,
            projected_error_threshold: params.projection_threshold,
            ..self.clone()
        }
    }

    /// Time after which the slope-noise filter releases.
    pub fn limit_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.limit_timeout_minutes.max(0.0) * 60.0)
    }
}

/// Save scheduling for learning state.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningSaveConfig {
    /// Periodic save interval (minutes).
    pub save_interval_minutes: f64,

    /// Also save after this many observed decisions (0 disables).
    pub save_every_decisions: u64,
}

impl Default for LearningSaveConfig {
    fn default() -> Self {
        Self {
            save_interval_minutes: DEFAULT_SAVE_INTERVAL_MINUTES,
            save_every_decisions: 0,
        }
    }
}

impl LearningSaveConfig {
    /// Clamp the save interval into its valid range.
    pub fn sanitize(mut self) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();
        self.save_interval_minutes = clamp_value(
            "save_interval",
            self.save_interval_minutes,
            DEFAULT_SAVE_INTERVAL_MINUTES,
            SAVE_INTERVAL_RANGE,
            &mut warnings,
        );
        for warning in &warnings {
            tracing::warn!(%warning, "Learning save configuration adjusted");
        }
        (self, warnings)
    }

    /// Periodic save interval.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs_f64(self.save_interval_minutes.max(0.0) * 60.0)
    }
}

fn clamp_value(
    key: &'static str,
    value: f64,
    default: f64,
    (min, max): (f64, f64),
    warnings: &mut Vec<ConfigWarning>,
) -> f64 {
    let clamped = if value.is_nan() {
        default
    } else {
        value.clamp(min, max)
    };
    if clamped != value {
        warnings.push(ConfigWarning::OutOfRange {
            key,
            value,
            clamped,
        });
    }
    clamped
}
