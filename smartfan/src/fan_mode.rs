//! Fan modes and the ordered ladder the controller moves along.
//!
//! Climate units expose their fan speeds as free-form names (`low`,
//! `medium`, `high`, `turbo`, ...). The controller only ever moves one
//! position at a time along the ladder, except for the emergency jump to
//! the top.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Fan speed names that are not a speed and never enter the ladder.
const NON_SPEED_MODES: &[&str] = &["auto", "off"];

/// A fan mode name as reported by the climate entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FanMode(String);

impl FanMode {
    /// Create a fan mode from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The mode name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FanMode {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for FanMode {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Ordered sequence of fan speeds, slowest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanModeLadder {
    modes: Vec<FanMode>,
}

impl FanModeLadder {
    /// Build a ladder from modes ordered slowest first.
    ///
    /// Returns [`ControlError::NoFanModes`] if the list is empty.
    pub fn new<I, M>(modes: I) -> Result<Self, ControlError>
    where
        I: IntoIterator<Item = M>,
        M: Into<FanMode>,
    {
        let modes: Vec<FanMode> = modes.into_iter().map(Into::into).collect();
        if modes.is_empty() {
            return Err(ControlError::NoFanModes);
        }
        Ok(Self { modes })
    }

    /// Build a ladder from the raw list a climate entity reports, dropping
    /// `auto` and `off`.
    pub fn from_entity_modes<S: AsRef<str>>(raw: &[S]) -> Result<Self, ControlError> {
        Self::new(
            raw.iter()
                .map(|m| m.as_ref())
                .filter(|m| !NON_SPEED_MODES.contains(&m.to_lowercase().as_str()))
                .map(FanMode::from),
        )
    }

    /// All modes, slowest first.
    pub fn modes(&self) -> &[FanMode] {
        &self.modes
    }

    /// Number of speeds.
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Companion of [`len`](Self::len). [`FanModeLadder::new`] rejects an
    /// empty list, so a constructed ladder never reports empty.
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// Index of the fastest speed.
    pub fn max_index(&self) -> usize {
        self.modes.len() - 1
    }

    /// Position of `mode`, or `None` if the entity reports a mode that is not
    /// on the ladder.
    pub fn index_of(&self, mode: &FanMode) -> Option<usize> {
        self.modes.iter().position(|m| m == mode)
    }

    /// Position of `mode`, falling back to the slowest speed for unknown
    /// or missing modes.
    pub fn index_or_lowest(&self, mode: Option<&FanMode>) -> usize {
        mode.and_then(|m| self.index_of(m)).unwrap_or(0)
    }

    /// The mode at `index`, clamped to the ladder bounds.
    pub fn mode_at(&self, index: usize) -> &FanMode {
        &self.modes[index.min(self.max_index())]
    }

    /// One position faster, clamped at the top.
    pub fn step_up(&self, index: usize) -> usize {
        (index + 1).min(self.max_index())
    }

    /// One position slower, clamped at the bottom.
    pub fn step_down(&self, index: usize) -> usize {
        index.saturating_sub(1)
    }

    /// The fastest mode.
    pub fn fastest(&self) -> &FanMode {
        self.mode_at(self.max_index())
    }

    /// Whether `mode` is on the ladder.
    pub fn contains(&self, mode: &FanMode) -> bool {
        self.index_of(mode).is_some()
    }
}
