//! Logical message record and the codec entry points.
//!
//! A [`Message`] is what the rest of the bridge works with: correlation id,
//! timestamp, and a typed payload. [`Message::decode`] and
//! [`Message::encode_to_vec`] are the codec surface; [`crate::Frame`] is the
//! intermediate wire form.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    errors::Result,
    frame::Frame,
    header::FrameHeader,
    payloads::{ErrorCode, ErrorPayload, Payload},
    types::MessageType,
};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Clock-before-epoch is treated as zero rather than an error; the validator
/// rejects zero timestamps on inbound frames anyway.
#[must_use]
pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or_default()
}

/// Logical record carried by one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Request-correlation id; zero means "none"
    pub request_id: u32,
    /// Sender timestamp, milliseconds since the Unix epoch
    pub timestamp_ms: f64,
    /// Typed payload
    pub payload: Payload,
}

impl Message {
    /// New uncorrelated message stamped with the current time.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self { request_id: 0, timestamp_ms: now_ms(), payload }
    }

    /// New message correlated to a request id.
    #[must_use]
    pub fn with_request_id(payload: Payload, request_id: u32) -> Self {
        Self { request_id, timestamp_ms: now_ms(), payload }
    }

    /// Response to this message: same correlation id, fresh timestamp.
    #[must_use]
    pub fn reply(&self, payload: Payload) -> Self {
        Self::with_request_id(payload, self.request_id)
    }

    /// Error frame bearing the original request id (zero when none).
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>, request_id: u32) -> Self {
        Self::with_request_id(Payload::Error(ErrorPayload::new(code, message)), request_id)
    }

    /// Raw message-type byte.
    #[must_use]
    pub fn msg_type(&self) -> u8 {
        self.payload.msg_type()
    }

    /// Message type as an enum. `None` for unknown types.
    #[must_use]
    pub fn kind(&self) -> Option<MessageType> {
        self.payload.kind()
    }

    /// Serialize to a frame, patching the payload length afterwards.
    pub fn to_frame(&self) -> Result<Frame> {
        let mut header = FrameHeader::new(self.msg_type());
        header.set_request_id(self.request_id);
        header.set_timestamp_ms(self.timestamp_ms);

        let mut payload = Vec::new();
        self.payload.encode(&mut payload)?;

        Frame::new(header, payload)
    }

    /// Reconstruct the logical record from a decoded frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let payload = Payload::decode(frame.header.msg_type(), &frame.payload)?;

        Ok(Self {
            request_id: frame.header.request_id(),
            timestamp_ms: frame.header.timestamp_ms(),
            payload,
        })
    }

    /// Codec entry point: bytes to message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let frame = Frame::decode(bytes)?;
        Self::from_frame(&frame)
    }

    /// Codec entry point: message to bytes.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.to_frame()?.encode_to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::streaming::MotionPayload;

    #[test]
    fn message_round_trip() {
        let message = Message::with_request_id(
            Payload::MotionData(MotionPayload {
                device_name: "dev-A".to_owned(),
                values: [12.5, -7.25],
            }),
            42,
        );

        let wire = message.encode_to_vec().unwrap();
        let decoded = Message::decode(&wire).unwrap();

        assert_eq!(message, decoded);
        assert_eq!(decoded.kind(), Some(MessageType::MotionData));
    }

    #[test]
    fn motion_frame_stays_small() {
        // Motion frames must stay in the tens of bytes; the fast path exists
        // so a thousand of these per second is cheap to produce and parse.
        let message = Message::new(Payload::MotionData(MotionPayload {
            device_name: "dev-A".to_owned(),
            values: [1.0, 2.0],
        }));

        let wire = message.encode_to_vec().unwrap();
        assert!(wire.len() <= 60, "motion frame was {} bytes", wire.len());
    }

    #[test]
    fn reply_keeps_request_id() {
        let request = Message::with_request_id(Payload::ScanRequest, 7);
        let response = request.reply(Payload::ScanResponse(crate::payloads::ble::ScanResult {
            success: true,
            devices: vec![],
            message: None,
        }));

        assert_eq!(response.request_id, 7);
    }

    #[test]
    fn error_carries_request_id() {
        let err = Message::error(ErrorCode::InvalidMessage, "bad frame", 9);
        assert_eq!(err.request_id, 9);
        assert_eq!(err.kind(), Some(MessageType::Error));
    }
}
