//! Logging setup for applications embedding the route engine

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{RouteError, RouteResult};

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level directive ("trace", "debug", "info", ...)
    pub level: String,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log span enter/exit
    pub log_spans: bool,
    /// Application name reported when logging starts
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "callroute".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: impl Into<String>, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level: level.into(),
            app_name: app_name.into(),
            ..Default::default()
        }
    }
}

/// Install a global subscriber for the given configuration.
///
/// Output goes to stderr. `RUST_LOG` directives are honoured on top of the
/// configured level. Fails if the level is invalid or a global subscriber is
/// already installed.
pub fn setup_logging(config: &LoggingConfig) -> RouteResult<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    result.map_err(|e| RouteError::config(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!(app = %config.app_name, version = crate::VERSION, "Logging initialized");
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> RouteResult<Level> {
    Level::from_str(level).map_err(|_| RouteError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(RouteError::Configuration { .. })));
    }

    #[test]
    #[serial]
    fn test_setup_rejects_bad_level_before_installing() {
        let config = LoggingConfig::new("verbose", "test");
        assert!(setup_logging(&config).is_err());
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: LoggingConfig = toml::from_str("level = \"trace\"\njson = true").unwrap();
        assert!(config.json);
        assert!(!config.file_info && !config.log_spans);
        assert_eq!(config.app_name, "callroute");
    }
}
