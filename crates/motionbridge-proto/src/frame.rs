//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet: a 16-byte raw binary header
//! followed by the already-encoded payload bytes. It is a pure data holder;
//! for the logical record see [`crate::Message`].

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// Complete protocol frame (transport layer).
///
/// Layout on the wire: `[FrameHeader: 16 bytes] + [payload: variable]`.
///
/// Holds raw payload bytes, not the decoded payload enum, so the session
/// layer can count, queue, and fan out frames without deserializing them.
///
/// # Invariants
///
/// - `payload.len()` matches `header.payload_len()`. Enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (16 bytes)
    pub header: FrameHeader,
    /// Raw payload bytes (already encoded)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame, patching the header's payload length to match.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the u16
    ///   length field
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();

        let len = u16::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: FrameHeader::MAX_PAYLOAD,
        })?;

        header.set_payload_len(len);

        Ok(Self { header, payload })
    }

    /// Encode the frame into a buffer.
    pub fn encode(&self, dst: &mut impl BufMut) {
        debug_assert_eq!(self.payload.len(), self.header.payload_len() as usize);

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Encode the frame into a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FrameHeader::SIZE + self.payload.len());
        self.encode(&mut buf);
        buf
    }

    /// Decode a frame from wire bytes.
    ///
    /// Returns a frame with raw payload bytes; use [`crate::Message::decode`]
    /// for the logical record. The buffer must hold exactly one frame: the
    /// declared payload length has to match the bytes actually present in
    /// both directions.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] / [`ProtocolError::UnsupportedVersion`]
    ///   if header parsing fails
    /// - [`ProtocolError::FrameTruncated`] if fewer payload bytes are present
    ///   than the header declares
    /// - [`ProtocolError::FrameOverrun`] if trailing bytes follow the
    ///   declared payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        let payload_len = header.payload_len() as usize;
        let total = FrameHeader::SIZE + payload_len;

        if bytes.len() < total {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_len,
                actual: bytes.len() - FrameHeader::SIZE,
            });
        }

        if bytes.len() > total {
            return Err(ProtocolError::FrameOverrun {
                expected: payload_len,
                actual: bytes.len() - FrameHeader::SIZE,
            });
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..total]);

        debug_assert_eq!(payload.len(), payload_len);

        Ok(Self { header: *header, payload })
    }
}
