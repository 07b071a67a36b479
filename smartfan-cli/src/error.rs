//! CLI error type.

use std::fmt;

use smartfan::config::ConfigError;
use smartfan::service::ServiceError;
use smartfan::{ControlError, StorageError};

/// Errors surfaced to the operator.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or settings.
    Config(String),
    /// The configuration file could not be read or written.
    ConfigFile(ConfigError),
    /// The fan-mode list or a control step was rejected.
    Control(ControlError),
    /// Learning records could not be read or written.
    Storage(StorageError),
    /// The service refused an operator request.
    Service(ServiceError),
    /// The async runtime could not be started.
    Runtime(std::io::Error),
    /// Output formatting failed.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Control(e) => write!(f, "Control error: {}", e),
            CliError::Storage(e) => write!(f, "Storage error: {}", e),
            CliError::Service(e) => write!(f, "{}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Control(e) => Some(e),
            CliError::Storage(e) => Some(e),
            CliError::Service(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Config(_) | CliError::Output(_) => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<ControlError> for CliError {
    fn from(e: ControlError) -> Self {
        CliError::Control(e)
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        CliError::Storage(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}
