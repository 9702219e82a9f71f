//! Error handling for the audio HAL core
//!
//! Every fallible operation of the routing, stream and call layers reports a
//! [`HalError`]. Transport failures after a stream is active are not surfaced
//! through reads and writes, which report the full byte count and pace the
//! caller. They show up here only when a stream is activated or a control
//! operation fails.

#![allow(missing_docs)]

use thiserror::Error;

use crate::hal::transport::Endpoint;

/// Result type alias for HAL operations
pub type HalResult<T> = std::result::Result<T, HalError>;

/// Error type for HAL operations
#[derive(Error, Debug)]
pub enum HalError {
    /// Unsupported format, rate or channel count, or a malformed parameter value
    #[error("Invalid argument: {details}")]
    InvalidArgument { details: String },

    /// Allocation failure, transport open failure or a full pre-processing chain
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    /// Duplicate output variant, or a feature not available in the current configuration
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    /// A transport endpoint vanished under an active stream
    #[error("No such device: {device}")]
    NoSuchDevice { device: String },

    /// Lookup of an item that is not registered (e.g. detaching an unattached effect)
    #[error("Not found: {item}")]
    NotFound { item: String },

    /// A mixer control required at initialization is absent
    #[error("Mixer control missing: {control}")]
    MissingControl { control: String },

    /// Transport endpoint open, read or write failure
    #[error("Transport error on {endpoint:?}: {reason}")]
    Transport { endpoint: Endpoint, reason: String },

    /// Configuration parse or validation failure
    #[error("Configuration error: {details}")]
    Config { details: String },

    /// I/O failure while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HalError {
    /// Create a new invalid argument error
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::InvalidArgument {
            details: details.into(),
        }
    }

    /// Create a new resource exhausted error
    pub fn resource_exhausted(resource: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create a new no such device error
    pub fn no_such_device(device: impl Into<String>) -> Self {
        Self::NoSuchDevice {
            device: device.into(),
        }
    }

    /// Create a new not found error
    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound { item: item.into() }
    }

    /// Create a new missing control error
    pub fn missing_control(control: impl Into<String>) -> Self {
        Self::MissingControl {
            control: control.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(endpoint: Endpoint, reason: impl Into<String>) -> Self {
        Self::Transport {
            endpoint,
            reason: reason.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(details: impl Into<String>) -> Self {
        Self::Config {
            details: details.into(),
        }
    }

    /// Only a missing mixer control at startup is fatal
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingControl { .. })
    }

    /// Negative POSIX status code for callers bridging to C-style status returns
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } | Self::MissingControl { .. } | Self::Config { .. } => -22,
            Self::ResourceExhausted { .. } | Self::Transport { .. } => -12,
            Self::UnsupportedOperation { .. } => -38,
            Self::NoSuchDevice { .. } => -19,
            Self::NotFound { .. } => -2,
            Self::Io(_) => -5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_control_is_fatal() {
        assert!(HalError::missing_control("DL1 Equalizer").is_fatal());
        assert!(!HalError::resource_exhausted("modem pcm").is_fatal());
        assert!(!HalError::transport(Endpoint::Modem, "not ready").is_fatal());
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(HalError::invalid_argument("rate").errno(), -22);
        assert_eq!(HalError::resource_exhausted("pcm").errno(), -12);
        assert_eq!(HalError::unsupported("duplicate output").errno(), -38);
        assert_eq!(HalError::no_such_device("capture").errno(), -19);
        assert_eq!(HalError::not_found("effect").errno(), -2);
    }

    #[test]
    fn test_display() {
        let err = HalError::not_found("effect 42");
        assert_eq!(err.to_string(), "Not found: effect 42");
    }
}
