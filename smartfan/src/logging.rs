//! Tracing subscriber setup.
//!
//! Console output always; optionally a daily-rolling log file. `RUST_LOG`
//! overrides the configured level.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of rolled log files.
pub const LOG_FILE_PREFIX: &str = "smartfan.log";

/// Logging options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rolling log files; console only when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Console logging at `level`.
    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    /// The filter to install, preferring `RUST_LOG`.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// stops the file writer. Returns `None` when logging to the console only,
/// or when a subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let console = fmt::layer()
        .with_target(false)
        .with_timer(LocalTime::rfc_3339());

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339())
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(config.filter())
                .with(console)
                .with(file)
                .try_init()
                .ok()
                .map(|_| guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(config.filter())
                .with(console)
                .try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_is_info() {
        assert_eq!(LoggingConfig::default().level, "info");
        assert!(LoggingConfig::default().log_dir.is_none());
    }

    #[test]
    fn test_with_level() {
        assert_eq!(LoggingConfig::with_level("debug").level, "debug");
    }
}
