//! Zone classification and fan-mode decisions.
//!
//! The [`DecisionEngine`] turns one cycle's temperatures, forecast and slope
//! into a fan-mode decision. It is pure: all history it needs (time since the
//! last change, slope snapshots) is passed in through [`DecisionInput`] by
//! the [`Controller`](crate::controller::Controller) that owns it.
//!
//! # Zones
//!
//! ```text
//! 1. Emergency    |current - target| > hard_error      -> fastest mode
//! 2. Braking      overshoot predicted, not yet realized -> step down
//! 3. Recovery     error > soft_error                    -> step up (or hold while improving)
//! 4. Maintenance  drift inside the comfort band         -> hold or step up once
//! 5. Over-Target  overshoot beyond the deadband         -> step down
//! 6. Stable       otherwise                             -> hold
//! ```
//!
//! Every zone except Emergency is subject to anti-cycling: a change needs
//! the minimum interval to have elapsed and a significant slope change
//! since the last snapshot, unless the limit timeout has also elapsed.

mod engine;
mod params;
mod zone;

pub use engine::{Decision, DecisionEngine, DecisionInput, Suppression, SLOPE_NOISE_THRESHOLD};
pub use params::ControlParameters;
pub use zone::{HvacMode, Zone};
