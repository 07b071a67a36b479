//! Control zones and HVAC direction.

use serde::{Deserialize, Serialize};

/// Situation a decision cycle was classified into.
///
/// Zones are evaluated in declaration order; the first that matches wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Error beyond the hard threshold. Maximum speed, no anti-cycling.
    Emergency,
    /// Overshoot predicted but not yet realized. Step down.
    Braking,
    /// Large error the trend is not yet correcting. Step up.
    Recovery,
    /// Drift inside the comfort band. Hold or micro-adjust.
    Maintenance,
    /// Overshoot realized beyond the deadband. Step down.
    OverTarget,
    /// On target with a negligible slope. Hold.
    #[default]
    Stable,
}

impl Zone {
    /// All zones in priority order.
    pub const ALL: [Zone; 6] = [
        Zone::Emergency,
        Zone::Braking,
        Zone::Recovery,
        Zone::Maintenance,
        Zone::OverTarget,
        Zone::Stable,
    ];

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Zone::Emergency => "error beyond hard threshold",
            Zone::Braking => "overshoot predicted",
            Zone::Recovery => "recovering from large error",
            Zone::Maintenance => "drifting within comfort band",
            Zone::OverTarget => "target exceeded",
            Zone::Stable => "on target",
        }
    }

    /// Whether the zone bypasses anti-cycling.
    pub fn bypasses_anti_cycling(&self) -> bool {
        matches!(self, Zone::Emergency)
    }
}

impl std::fmt::Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Emergency => write!(f, "emergency"),
            Zone::Braking => write!(f, "braking"),
            Zone::Recovery => write!(f, "recovery"),
            Zone::Maintenance => write!(f, "maintenance"),
            Zone::OverTarget => write!(f, "over_target"),
            Zone::Stable => write!(f, "stable"),
        }
    }
}

/// Direction the HVAC unit is moving the temperature.
///
/// Errors are expressed relative to this direction: a positive error always
/// means "more fan output would help".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    #[default]
    Heat,
    Cool,
}

impl HvacMode {
    /// +1 when the unit raises temperature, -1 when it lowers it.
    pub fn sign(&self) -> f64 {
        match self {
            HvacMode::Heat => 1.0,
            HvacMode::Cool => -1.0,
        }
    }

    /// Error towards the target: positive when the room still needs output.
    pub fn signed_error(&self, current: f64, target: f64) -> f64 {
        self.sign() * (target - current)
    }

    /// A temperature rate expressed in the unit's output direction.
    pub fn directed(&self, rate: f64) -> f64 {
        self.sign() * rate
    }
}

impl std::fmt::Display for HvacMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HvacMode::Heat => write!(f, "heat"),
            HvacMode::Cool => write!(f, "cool"),
        }
    }
}

impl std::str::FromStr for HvacMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "heat" | "heating" => Ok(HvacMode::Heat),
            "cool" | "cooling" => Ok(HvacMode::Cool),
            other => Err(format!("unknown HVAC mode '{}'", other)),
        }
    }
}
