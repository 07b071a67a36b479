//! INI configuration file.
//!
//! The file carries global controller defaults, learning persistence
//! settings, and optional per-entity sections that list the entity's fan
//! modes and override individual parameters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ini::{Ini, Properties};
use thiserror::Error;

use super::{ConfigWarning, ControllerConfig, LearningSaveConfig};

const CONTROLLER_SECTION: &str = "controller";
const LEARNING_SECTION: &str = "learning";
const STORAGE_SECTION: &str = "storage";
const ENTITY_SECTION_PREFIX: &str = "entity:";

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("Configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid INI.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// No section exists for the requested entity.
    #[error("Unknown entity '{0}'")]
    UnknownEntity(String),
}

impl From<ini::Error> for ConfigError {
    fn from(e: ini::Error) -> Self {
        match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(parse) => ConfigError::Parse(parse.to_string()),
        }
    }
}

/// Per-entity configuration section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySettings {
    /// Fan modes of the entity, slowest first. Empty means "discover".
    pub fan_modes: Vec<String>,

    /// Raw overrides applied on top of the global controller section.
    overrides: BTreeMap<String, String>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Global controller defaults.
    pub controller: ControllerConfig,

    /// Learning save scheduling.
    pub learning: LearningSaveConfig,

    /// Directory holding learning records.
    pub storage_dir: PathBuf,

    /// Per-entity sections keyed by entity id.
    pub entities: BTreeMap<String, EntitySettings>,

    /// Adjustments made while parsing.
    pub warnings: Vec<ConfigWarning>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            learning: LearningSaveConfig::default(),
            storage_dir: default_storage_dir(),
            entities: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }
}

/// Default location of the configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartfan")
        .join("config.ini")
}

/// Default directory for learning records.
pub fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("smartfan")
        .join("learning")
}

impl ConfigFile {
    /// Load from the default path.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        Ok(Self::from_ini(&ini))
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(Self::from_ini(&ini))
    }

    fn from_ini(ini: &Ini) -> Self {
        let mut config = Self::default();
        let mut warnings = Vec::new();

        if let Some(section) = ini.section(Some(CONTROLLER_SECTION)) {
            apply_controller_properties(
                &mut config.controller,
                section.iter(),
                &mut warnings,
            );
        }

        if let Some(section) = ini.section(Some(LEARNING_SECTION)) {
            for (key, value) in section.iter() {
                match key {
                    "enabled" => {
                        set_bool(&mut config.controller.enable_adaptive_learning, key, value, &mut warnings)
                    }
                    "learning_rate" => {
                        set_f64(&mut config.controller.learning_rate, key, value, &mut warnings)
                    }
                    "save_interval" => {
                        set_f64(&mut config.learning.save_interval_minutes, key, value, &mut warnings)
                    }
                    "save_every_decisions" => match value.trim().parse::<u64>() {
                        Ok(n) => config.learning.save_every_decisions = n,
                        Err(_) => warnings.push(unparseable(key, value)),
                    },
                    _ => tracing::debug!(key, "Ignoring unknown learning setting"),
                }
            }
        }

        if let Some(dir) = ini
            .section(Some(STORAGE_SECTION))
            .and_then(|s| s.get("directory"))
        {
            config.storage_dir = PathBuf::from(dir.trim());
        }

        for (name, properties) in ini.iter() {
            let Some(entity_id) = name.and_then(|n| n.strip_prefix(ENTITY_SECTION_PREFIX)) else {
                continue;
            };
            config
                .entities
                .insert(entity_id.trim().to_string(), parse_entity(properties));
        }

        let (controller, controller_warnings) = config.controller.sanitize();
        let (learning, learning_warnings) = config.learning.sanitize();
        config.controller = controller;
        config.learning = learning;

        for warning in &warnings {
            tracing::warn!(%warning, "Configuration value ignored");
        }
        warnings.extend(controller_warnings);
        warnings.extend(learning_warnings);
        config.warnings = warnings;
        config
    }

    /// Effective controller configuration for `entity_id`.
    ///
    /// Entity sections override the global controller section; entities
    /// without a section use the global values.
    pub fn controller_for(&self, entity_id: &str) -> ControllerConfig {
        let Some(entity) = self.entities.get(entity_id) else {
            return self.controller.clone();
        };
        let mut config = self.controller.clone();
        let mut warnings = Vec::new();
        apply_controller_properties(
            &mut config,
            entity.overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &mut warnings,
        );
        for warning in &warnings {
            tracing::warn!(entity = entity_id, %warning, "Entity configuration value ignored");
        }
        config.sanitize().0
    }

    /// Replace the parameters of `entity_id` in its own section.
    ///
    /// Creates the section if needed so other entities keep the global
    /// defaults.
    pub fn set_entity_controller(&mut self, entity_id: &str, controller: &ControllerConfig) {
        let entity = self.entities.entry(entity_id.to_string()).or_default();
        for (key, value) in controller_properties(controller) {
            entity.overrides.insert(key.to_string(), value);
        }
    }

    /// Serialize to INI.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        {
            let mut section = ini.with_section(Some(CONTROLLER_SECTION));
            for (key, value) in controller_properties(&self.controller) {
                section.set(key, value);
            }
        }
        ini.with_section(Some(LEARNING_SECTION))
            .set("enabled", self.controller.enable_adaptive_learning.to_string())
            .set("learning_rate", self.controller.learning_rate.to_string())
            .set("save_interval", self.learning.save_interval_minutes.to_string())
            .set(
                "save_every_decisions",
                self.learning.save_every_decisions.to_string(),
            );
        ini.with_section(Some(STORAGE_SECTION))
            .set("directory", self.storage_dir.to_string_lossy().to_string());

        for (entity_id, settings) in &self.entities {
            let name = format!("{}{}", ENTITY_SECTION_PREFIX, entity_id);
            let mut section = ini.with_section(Some(name));
            if !settings.fan_modes.is_empty() {
                section.set("fan_modes", settings.fan_modes.join(", "));
            }
            for (key, value) in &settings.overrides {
                section.set(key.as_str(), value.as_str());
            }
        }
        ini
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }
}

fn parse_entity(properties: &Properties) -> EntitySettings {
    let mut settings = EntitySettings::default();
    for (key, value) in properties.iter() {
        if key == "fan_modes" {
            settings.fan_modes = value
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
        } else {
            settings.overrides.insert(key.to_string(), value.to_string());
        }
    }
    settings
}

fn controller_properties(config: &ControllerConfig) -> [(&'static str, String); 6] {
    [
        ("deadband", config.deadband.to_string()),
        ("min_interval", config.min_interval_minutes.to_string()),
        ("soft_error", config.soft_error.to_string()),
        ("hard_error", config.hard_error.to_string()),
        (
            "projected_error_threshold",
            config.projected_error_threshold.to_string(),
        ),
        ("limit_timeout", config.limit_timeout_minutes.to_string()),
    ]
}

fn apply_controller_properties<'a>(
    config: &mut ControllerConfig,
    properties: impl Iterator<Item = (&'a str, &'a str)>,
    warnings: &mut Vec<ConfigWarning>,
) {
    for (key, value) in properties {
        let target = match key {
            "deadband" => &mut config.deadband,
            "min_interval" => &mut config.min_interval_minutes,
            "soft_error" => &mut config.soft_error,
            "hard_error" => &mut config.hard_error,
            "projected_error_threshold" => &mut config.projected_error_threshold,
            "limit_timeout" => &mut config.limit_timeout_minutes,
            "learning_rate" => &mut config.learning_rate,
            "enabled" => {
                set_bool(&mut config.enable_adaptive_learning, key, value, warnings);
                continue;
            }
            _ => {
                tracing::debug!(key, "Ignoring unknown controller setting");
                continue;
            }
        };
        set_f64(target, key, value, warnings);
    }
}

fn set_f64(target: &mut f64, key: &str, value: &str, warnings: &mut Vec<ConfigWarning>) {
    match value.trim().parse::<f64>() {
        Ok(v) => *target = v,
        Err(_) => warnings.push(unparseable(key, value)),
    }
}

fn set_bool(target: &mut bool, key: &str, value: &str, warnings: &mut Vec<ConfigWarning>) {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => *target = true,
        "false" | "no" | "off" | "0" => *target = false,
        _ => warnings.push(unparseable(key, value)),
    }
}

fn unparseable(key: &str, value: &str) -> ConfigWarning {
    ConfigWarning::Unparseable {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[controller]
deadband = 0.25
min_interval = 12
hard_error = 0.8

[learning]
enabled = false
learning_rate = 0.5
save_interval = 30
save_every_decisions = 50

[storage]
directory = /var/lib/smartfan

[entity:climate.living_room]
fan_modes = low, medium, high, turbo
deadband = 0.3
"#;

    #[test]
    fn test_parse_sections() {
        let config = ConfigFile::parse(SAMPLE).unwrap();

        assert_eq!(config.controller.deadband, 0.25);
        assert_eq!(config.controller.min_interval_minutes, 12.0);
        assert_eq!(config.controller.hard_error, 0.8);
        assert!(!config.controller.enable_adaptive_learning);
        assert_eq!(config.learning.save_interval_minutes, 30.0);
        assert_eq!(config.learning.save_every_decisions, 50);
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/smartfan"));

        let entity = &config.entities["climate.living_room"];
        assert_eq!(entity.fan_modes, vec!["low", "medium", "high", "turbo"]);
    }

    #[test]
    fn test_learning_rate_is_clamped_with_warning() {
        let config = ConfigFile::parse(SAMPLE).unwrap();
        assert_eq!(config.controller.learning_rate, 0.2);
        assert!(config.warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::OutOfRange {
                key: "learning_rate",
                ..
            }
        )));
    }

    #[test]
    fn test_entity_overrides_global() {
        let config = ConfigFile::parse(SAMPLE).unwrap();
        assert_eq!(config.controller_for("climate.living_room").deadband, 0.3);
        assert_eq!(config.controller_for("climate.office").deadband, 0.25);
    }

    #[test]
    fn test_unparseable_value_keeps_default() {
        let config = ConfigFile::parse("[controller]\ndeadband = wide\n").unwrap();
        assert_eq!(config.controller.deadband, super::super::DEFAULT_DEADBAND);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::parse(SAMPLE).unwrap();
        let learned = ControllerConfig {
            soft_error: 0.45,
            ..config.controller_for("climate.living_room")
        };
        config.set_entity_controller("climate.living_room", &learned);
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded.controller, config.controller);
        assert_eq!(reloaded.controller_for("climate.living_room").soft_error, 0.45);
        assert_eq!(
            reloaded.entities["climate.living_room"].fan_modes,
            vec!["low", "medium", "high", "turbo"]
        );
    }
}
