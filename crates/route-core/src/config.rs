//! Coordinator configuration
//!
//! ```rust
//! use callroute_core::config::RouteConfig;
//!
//! let config = RouteConfig::from_toml_str(r#"
//!     use_managed_routing = true
//!     event_channel_capacity = 16
//!
//!     [logging]
//!     level = "debug"
//! "#).unwrap();
//!
//! assert!(config.use_managed_routing);
//! assert_eq!(config.event_channel_capacity, 16);
//! assert!(config.hide_earpiece_with_headphones);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RouteError, RouteResult};
use crate::logging::LoggingConfig;

/// Default capacity of the notification broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for a [`RouteCoordinator`](crate::RouteCoordinator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Prefer the managed call-routing provider when the platform has one
    pub use_managed_routing: bool,
    /// Buffered notifications per subscriber before the slowest one lags
    pub event_channel_capacity: usize,
    /// Hide the earpiece from device lists while headphones are plugged in
    pub hide_earpiece_with_headphones: bool,
    pub logging: LoggingConfig,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            use_managed_routing: false,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            hide_earpiece_with_headphones: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl RouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_managed_routing(mut self, enabled: bool) -> Self {
        self.use_managed_routing = enabled;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_hide_earpiece_with_headphones(mut self, hide: bool) -> Self {
        self.hide_earpiece_with_headphones = hide;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> RouteResult<Self> {
        let config: RouteConfig =
            toml::from_str(s).map_err(|e| RouteError::config(format!("Invalid route config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> RouteResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RouteError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> RouteResult<()> {
        if self.event_channel_capacity == 0 {
            return Err(RouteError::config("event_channel_capacity must be greater than zero"));
        }
        crate::logging::parse_log_level(&self.logging.level)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RouteConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.use_managed_routing);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = RouteConfig::new().with_event_channel_capacity(0);
        assert!(matches!(config.validate(), Err(RouteError::Configuration { .. })));
        assert!(RouteConfig::from_toml_str("event_channel_capacity = 0").is_err());
    }

    #[test]
    fn test_bad_toml_and_bad_level() {
        assert!(RouteConfig::from_toml_str("use_managed_routing = \"yes\"").is_err());
        assert!(RouteConfig::from_toml_str("[logging]\nlevel = \"chatty\"").is_err());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(RouteConfig::from_toml_str("").unwrap(), RouteConfig::default());
    }
}
