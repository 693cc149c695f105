//! Error types for the route engine

use thiserror::Error;

use crate::device::AudioMode;

/// Result type for route operations
pub type RouteResult<T> = Result<T, RouteError>;

/// Result type for calls into the platform collaborators
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors surfaced by the coordinator and its providers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Argument outside the accepted range (e.g. an unknown audio mode)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The active provider refused the requested mode
    #[error("Failed to set audio mode to {mode}: {reason}")]
    RouteActivationFailed { mode: i32, reason: String },

    /// A provider could not attach to its platform integration
    #[error("Route provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// A platform call failed
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The coordinator worker is no longer running
    #[error("Route coordinator is closed")]
    CoordinatorClosed,
}

impl RouteError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a route activation error for the given mode
    pub fn route_activation(mode: AudioMode, reason: impl Into<String>) -> Self {
        Self::RouteActivationFailed {
            mode: mode.as_raw(),
            reason: reason.into(),
        }
    }

    /// Create a provider unavailable error
    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Errors reported by an [`AudioSystem`](crate::platform::AudioSystem) or
/// [`CallAudioService`](crate::platform::CallAudioService) implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform rejected the call
    #[error("{operation} rejected by platform: {reason}")]
    Rejected { operation: String, reason: String },

    /// The platform service is not reachable
    #[error("Platform service unavailable: {service}")]
    Unavailable { service: String },
}

impl PlatformError {
    /// Create a rejected-call error
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_activation_message() {
        let err = RouteError::route_activation(AudioMode::AudioCall, "focus denied");
        assert_eq!(err.to_string(), "Failed to set audio mode to 1: focus denied");
    }

    #[test]
    fn test_platform_error_converts() {
        let err: RouteError = PlatformError::rejected("setSpeakerphoneOn", "busy").into();
        assert!(matches!(err, RouteError::Platform(PlatformError::Rejected { .. })));
    }
}
