//! Error types for hwkit
//!
//! Every device interaction resolves to an `HwResult<T>`. Vendor bindings raise their
//! own native errors; adapters translate them into `HwError` at the boundary so the
//! session core never sees a vendor-specific error type.

use thiserror::Error;

/// Result type alias for hwkit operations
pub type HwResult<T> = Result<T, HwError>;

/// Top-level error type for all hardware wallet operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HwError {
    /// No client is open and connecting did not produce one
    #[error("Hardware wallet not connected")]
    NotConnected,

    /// Enumeration found no device of any enabled vendor kind
    #[error("No hardware wallet device detected")]
    NoDeviceDetected,

    /// Device id is not part of the current device list
    #[error("Hardware wallet device not found: {device_id}")]
    NotFound { device_id: String },

    /// The vendor SDK could not open a client for the device
    #[error("Cannot open hardware wallet device: {reason}")]
    ConnectionFailed { reason: String },

    /// Two vendor SDKs that cannot coexist in one process were requested
    #[error("{message}")]
    PlatformConflict { message: String },

    /// The user cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The device rejected or requested a PIN
    #[error("PIN error: {message}")]
    PinRequired { message: String },

    /// The device went away in the middle of a call
    #[error("The hardware wallet device has been disconnected: {reason}")]
    Disconnected { reason: String },

    /// The device or its firmware does not support the requested feature
    #[error("{detail}")]
    CapabilityUnsupported {
        detail: String,
        help_url: Option<String>,
    },

    /// An argument was rejected before the device was touched
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Opaque failure reported by the vendor SDK
    #[error("{operation} failed: {message}")]
    VendorError { operation: String, message: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Broken internal invariant
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl HwError {
    pub fn unsupported(detail: impl Into<String>) -> Self {
        HwError::CapabilityUnsupported {
            detail: detail.into(),
            help_url: None,
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        HwError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn vendor(operation: impl Into<String>, message: impl Into<String>) -> Self {
        HwError::VendorError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HwError::Cancelled)
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, HwError::Disconnected { .. })
    }

    pub fn is_pin(&self) -> bool {
        matches!(self, HwError::PinRequired { .. })
    }

    /// Reference link for errors surfaced to the user together with documentation
    pub fn help_url(&self) -> Option<&str> {
        match self {
            HwError::CapabilityUnsupported { help_url, .. } => help_url.as_deref(),
            _ => None,
        }
    }
}

impl From<crate::model::Bip32PathError> for HwError {
    fn from(err: crate::model::Bip32PathError) -> Self {
        HwError::invalid_argument(err.to_string())
    }
}

impl From<crate::model::WordCountError> for HwError {
    fn from(err: crate::model::WordCountError) -> Self {
        HwError::invalid_argument(err.to_string())
    }
}
