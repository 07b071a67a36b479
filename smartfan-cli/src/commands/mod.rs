//! CLI subcommands and the helpers they share.

pub mod config;
pub mod learning;
pub mod simulate;

use std::path::Path;

use smartfan::config::{config_file_path, ConfigFile};
use smartfan::FanModeLadder;

use crate::error::CliError;

/// Fan modes used when neither the command line nor the entity section
/// lists any.
pub const DEFAULT_FAN_MODES: &[&str] = &["low", "medium", "high", "turbo"];

/// Load the configuration from `path`, or from the default location when
/// it exists. A missing default file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load_from(path)?),
        None => {
            let default = config_file_path();
            if default.exists() {
                Ok(ConfigFile::load_from(&default)?)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}

/// Fan-mode ladder for `entity_id`: explicit list first, then the entity
/// section, then [`DEFAULT_FAN_MODES`].
pub fn resolve_ladder(
    explicit: Option<&str>,
    config: &ConfigFile,
    entity_id: &str,
) -> Result<FanModeLadder, CliError> {
    if let Some(list) = explicit {
        let modes: Vec<&str> = list.split(',').map(str::trim).filter(|m| !m.is_empty()).collect();
        return Ok(FanModeLadder::from_entity_modes(&modes)?);
    }
    match config.entities.get(entity_id) {
        Some(entity) if !entity.fan_modes.is_empty() => {
            Ok(FanModeLadder::from_entity_modes(&entity.fan_modes)?)
        }
        _ => Ok(FanModeLadder::new(DEFAULT_FAN_MODES.iter().copied())?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_fan_modes_win() {
        let config = ConfigFile::parse("[entity:climate.a]\nfan_modes = low, high\n").unwrap();
        let ladder = resolve_ladder(Some("quiet, boost"), &config, "climate.a").unwrap();
        assert_eq!(ladder.len(), 2);
        assert_eq!(ladder.fastest().as_str(), "boost");
    }

    #[test]
    fn test_entity_section_fan_modes() {
        let config = ConfigFile::parse("[entity:climate.a]\nfan_modes = auto, low, high\n").unwrap();
        let ladder = resolve_ladder(None, &config, "climate.a").unwrap();
        assert_eq!(ladder.len(), 2);
    }

    #[test]
    fn test_default_fan_modes() {
        let ladder = resolve_ladder(None, &ConfigFile::default(), "climate.b").unwrap();
        assert_eq!(ladder.len(), DEFAULT_FAN_MODES.len());
    }

    #[test]
    fn test_empty_explicit_list_is_rejected() {
        assert!(resolve_ladder(Some(" , "), &ConfigFile::default(), "climate.b").is_err());
    }
}
