//! Error taxonomy shared across the annunciator.
//!
//! Callers branch on the variant, not on the message:
//! - `Device` means the sign stopped answering and power-cycle recovery is due.
//! - `LeaseUnavailable` means someone else is changing the display; most
//!   callers log and drop the request.
//! - `Validation` marks malformed upstream data; the cycle is skipped.
//! - `Protocol` marks a malformed client request; the client gets `NAK`.

use thiserror::Error;

use crate::effects::{DeviceError, IntercomError};

/// Result type for annunciator operations
pub type Result<T> = std::result::Result<T, AnnunciatorError>;

/// Errors raised by display arbitration and its orchestrators
#[derive(Debug, Error)]
pub enum AnnunciatorError {
    /// Sign unreachable after bounded retries
    #[error("sign device error: {0}")]
    Device(#[from] DeviceError),

    /// Lease on the sign could not be acquired in time
    #[error("sign lease unavailable after {attempts} attempts")]
    LeaseUnavailable { attempts: u32 },

    /// Malformed upstream data
    #[error("validation failed: {0}")]
    Validation(String),

    /// Malformed client request
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Intercom hardware action failed
    #[error("intercom error: {0}")]
    Intercom(#[from] IntercomError),

    /// Process is shutting down
    #[error("shutdown in progress")]
    Shutdown,
}

impl AnnunciatorError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        AnnunciatorError::Validation(message.into())
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        AnnunciatorError::Protocol(message.into())
    }

    pub fn is_device(&self) -> bool {
        matches!(self, AnnunciatorError::Device(_))
    }

    pub fn is_lease_unavailable(&self) -> bool {
        matches!(self, AnnunciatorError::LeaseUnavailable { .. })
    }
}
