//! Error types for the bridge runtime.
//!
//! Strongly-typed errors for the transport and processing layers. Each
//! variant knows which wire [`ErrorCode`] it surfaces as, so building an
//! error frame from a failure is a single call.

use motionbridge_proto::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Errors produced by the transports, router, and domain processors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// Reliable request exhausted its retries without a response.
    #[error("reliable request timed out after {attempts} attempts")]
    Timeout {
        /// Send attempts made, including the first
        attempts: u32,
    },

    /// The session closed while a request was outstanding.
    #[error("session closed with requests outstanding")]
    SessionClosed,

    /// The bridge is shutting down.
    #[error("bridge shutting down")]
    Shutdown,

    /// A pending request outlived its maximum lifetime and was swept.
    #[error("pending request expired")]
    Expired,

    /// The device port was not injected.
    #[error("device port not available")]
    DeviceUnavailable,

    /// A port operation addressed a device id nobody knows.
    #[error("device not found: {id}")]
    DeviceNotFound {
        /// The unknown device id
        id: String,
    },

    /// An injected port failed at the transport level.
    #[error("port operation failed: {0}")]
    Port(String),

    /// Wire-format failure while building or parsing a frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl BridgeError {
    /// Wire error code this failure surfaces as.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::DeviceUnavailable | Self::Port(_) => ErrorCode::DeviceUnavailable,
            Self::DeviceNotFound { .. } => ErrorCode::DeviceNotFound,
            Self::SessionClosed | Self::Shutdown | Self::Expired | Self::Protocol(_) => {
                ErrorCode::InvalidMessage
            },
        }
    }

    /// Whether a retry may succeed. Timeouts and port transport failures
    /// are transient; protocol violations and closed sessions are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Port(_))
    }
}
