//! Smart Fan Controller - adaptive fan-speed control for HVAC units
//!
//! This library decides the fan speed of a climate unit from a temperature
//! target, the measured thermal slope and acceleration, and what each fan
//! speed has achieved in the past.
//!
//! # Architecture
//!
//! ```text
//! SensorSample ──► Controller ──► ThermalForecaster ──► DecisionEngine ──► FanCommand
//!                      │                                      ▲
//!                      │ observe()                            │ blended parameters
//!                      ▼                                      │
//!               AdaptiveLearningEngine ───────────────────────┘
//!                      │
//!                      ▼ save (timer, shutdown, every N decisions)
//!                LearningStore
//! ```
//!
//! [`service::FanControlService`] owns one [`controller::Controller`] per
//! climate entity and drives the loop.

pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod fan_mode;
pub mod forecast;
pub mod learning;
pub mod logging;
pub mod service;
pub mod store;

/// Library version, used in log banners and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{ControlError, StorageError};
pub use fan_mode::{FanMode, FanModeLadder};
