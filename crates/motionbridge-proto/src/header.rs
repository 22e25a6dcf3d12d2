//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 16-byte structure serialized as raw binary
//! (little endian). Keeping it self-delimiting lets the session layer route
//! and validate frames without touching the payload, which matters on the
//! motion fast path where thousands of frames per second flow through.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Fixed 16-byte frame header (little-endian byte order).
///
/// Layout on the wire, in field order:
///
/// | offset | size | field |
/// |---|---|---|
/// | 0 | 1 | protocol version (currently 1) |
/// | 1 | 1 | message type |
/// | 2 | 2 | payload length (u16) |
/// | 4 | 4 | request-correlation id (u32, 0 = none) |
/// | 8 | 8 | timestamp (f64, ms since Unix epoch) |
///
/// Fields are stored as raw byte arrays to avoid alignment issues; all
/// 16-byte patterns parse without undefined behavior, so the header can be
/// cast straight out of an untrusted network buffer.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    version: u8,
    msg_type: u8,
    pub(crate) payload_len: [u8; 2],
    request_id: [u8; 4],
    timestamp: [u8; 8],
}

impl FrameHeader {
    /// Size of the serialized header (16 bytes).
    pub const SIZE: usize = 16;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size in bytes. The length field is a u16, so the
    /// declared size can never exceed this; decode still checks it so the
    /// limit survives a future widening of the field.
    pub const MAX_PAYLOAD: usize = u16::MAX as usize;

    /// Maximum total frame size (header plus payload).
    pub const MAX_FRAME: usize = Self::SIZE + Self::MAX_PAYLOAD;

    /// Create a new header for the given message type.
    ///
    /// Payload length, request id, and timestamp start zeroed; the frame
    /// constructor patches the length after payload serialization.
    #[must_use]
    pub fn new(msg_type: u8) -> Self {
        Self {
            version: Self::VERSION,
            msg_type,
            payload_len: [0; 2],
            request_id: [0; 4],
            timestamp: [0; 8],
        }
    }

    /// Parse a header from network bytes (zero-copy, safe).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than 16 bytes are available
    /// - [`ProtocolError::UnsupportedVersion`] if the version byte differs
    ///   from [`Self::VERSION`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        Ok(header)
    }

    /// Serialize the header to its 16-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Protocol version byte.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Raw message type byte. Range membership determines the routing domain.
    #[must_use]
    pub fn msg_type(&self) -> u8 {
        self.msg_type
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn payload_len(&self) -> u16 {
        u16::from_le_bytes(self.payload_len)
    }

    /// Request-correlation id. Zero means "no correlation".
    #[must_use]
    pub fn request_id(&self) -> u32 {
        u32::from_le_bytes(self.request_id)
    }

    /// Sender timestamp in milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_ms(&self) -> f64 {
        f64::from_le_bytes(self.timestamp)
    }

    /// Update the message type.
    pub fn set_msg_type(&mut self, msg_type: u8) {
        self.msg_type = msg_type;
    }

    /// Update the declared payload length.
    pub fn set_payload_len(&mut self, len: u16) {
        self.payload_len = len.to_le_bytes();
    }

    /// Update the request-correlation id.
    pub fn set_request_id(&mut self, request_id: u32) {
        self.request_id = request_id.to_le_bytes();
    }

    /// Update the timestamp.
    pub fn set_timestamp_ms(&mut self, timestamp_ms: f64) {
        self.timestamp = timestamp_ms.to_le_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("version", &self.version())
            .field("msg_type", &format!("{:#04x}", self.msg_type()))
            .field("payload_len", &self.payload_len())
            .field("request_id", &self.request_id())
            .field("timestamp_ms", &self.timestamp_ms())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::SIZE, 16);
    }

    #[test]
    fn round_trip() {
        let mut header = FrameHeader::new(0x30);
        header.set_payload_len(42);
        header.set_request_id(7);
        header.set_timestamp_ms(1_700_000_000_123.5);

        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(&header, parsed);
        assert_eq!(parsed.msg_type(), 0x30);
        assert_eq!(parsed.payload_len(), 42);
        assert_eq!(parsed.request_id(), 7);
        assert!((parsed.timestamp_ms() - 1_700_000_000_123.5).abs() < f64::EPSILON);
    }

    #[test]
    fn reject_short_buffer() {
        let short = [0u8; 9];
        assert_eq!(
            FrameHeader::from_bytes(&short),
            Err(ProtocolError::FrameTooShort { expected: 16, actual: 9 })
        );
    }

    #[test]
    fn reject_wrong_version() {
        let mut bytes = FrameHeader::new(0x01).to_bytes();
        bytes[0] = 0x02;
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x02))
        );
    }
}
