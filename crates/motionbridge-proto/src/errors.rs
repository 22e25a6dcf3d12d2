//! Error types for wire-format encoding and decoding.
//!
//! Codec errors are deliberately separate from runtime errors: a decode
//! failure produces an error frame back to the sender and never terminates
//! the session, so these types must stay cheap to construct and format.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames and payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer is smaller than the fixed header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum byte count required
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Header declares more payload bytes than the buffer holds.
    #[error("frame truncated: header declares {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size the header claims
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Buffer holds more bytes than the header declares. The transport is
    /// message-oriented, so trailing bytes mean a framing bug, not a
    /// second frame.
    #[error("frame overrun: header declares {expected} payload bytes, buffer holds {actual}")]
    FrameOverrun {
        /// Payload size the header claims
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Version byte does not match the supported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the wire maximum.
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Offending payload size
        size: usize,
        /// Protocol maximum
        max: usize,
    },

    /// Serialization of a structured-text payload failed.
    #[error("json encode failed: {0}")]
    JsonEncode(String),

    /// Deserialization of a structured-text payload failed.
    #[error("json decode failed: {0}")]
    JsonDecode(String),

    /// Motion fast-path payload is shorter than its own length fields claim.
    #[error("motion payload truncated: expected {expected} bytes, got {actual}")]
    MotionTruncated {
        /// Bytes the fast-path layout requires
        expected: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Motion payload carries the wrong number of floats.
    #[error("motion payload carries {actual} floats, protocol requires {expected}")]
    MotionWidth {
        /// The fixed protocol constant
        expected: usize,
        /// Float count found on the wire
        actual: usize,
    },

    /// Motion device name is not valid UTF-8.
    #[error("motion device name is not valid utf-8")]
    MotionDeviceName,
}
