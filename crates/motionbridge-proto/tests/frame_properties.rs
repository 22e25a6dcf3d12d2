//! Property tests for the wire codec.

use motionbridge_proto::{
    Frame, FrameHeader, Message, Payload, ProtocolError,
    payloads::{
        ble::{ConnectRequest, DeviceInfo, ScanResult},
        streaming::MotionPayload,
    },
};
use proptest::prelude::*;

fn finite_f32() -> impl Strategy<Value = f32> {
    (-10_000.0f32..10_000.0).prop_filter("finite", |v| v.is_finite())
}

fn positive_timestamp() -> impl Strategy<Value = f64> {
    1.0f64..4_102_444_800_000.0 // through year 2100
}

fn device_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,32}"
}

proptest! {
    #[test]
    fn motion_message_round_trip(
        request_id in any::<u32>(),
        timestamp_ms in positive_timestamp(),
        name in device_name(),
        left in finite_f32(),
        right in finite_f32(),
    ) {
        let message = Message {
            request_id,
            timestamp_ms,
            payload: Payload::MotionData(MotionPayload {
                device_name: name,
                values: [left, right],
            }),
        };

        let wire = message.encode_to_vec().unwrap();
        let decoded = Message::decode(&wire).unwrap();

        prop_assert_eq!(message, decoded);
    }

    #[test]
    fn json_message_round_trip(
        request_id in any::<u32>(),
        timestamp_ms in positive_timestamp(),
        device_id in device_name(),
        name in device_name(),
        battery in proptest::option::of(0u8..=100),
    ) {
        let request = Message {
            request_id,
            timestamp_ms,
            payload: Payload::ConnectRequest(ConnectRequest {
                device_id: device_id.clone(),
                name: name.clone(),
            }),
        };
        prop_assert_eq!(&request, &Message::decode(&request.encode_to_vec().unwrap()).unwrap());

        let response = Message {
            request_id,
            timestamp_ms,
            payload: Payload::ScanResponse(ScanResult {
                success: true,
                devices: vec![DeviceInfo {
                    id: device_id,
                    name,
                    battery_level: battery,
                    connected: false,
                    streaming: false,
                }],
                message: None,
            }),
        };
        prop_assert_eq!(&response, &Message::decode(&response.encode_to_vec().unwrap()).unwrap());
    }

    #[test]
    fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        // Arbitrary junk must produce a clean error or a message, never a panic.
        let _ = Message::decode(&bytes);
    }

    #[test]
    fn wrong_version_rejected(version in 2u8..) {
        let frame = Frame::new(FrameHeader::new(0x01), Vec::new()).unwrap();
        let mut wire = frame.encode_to_vec();
        wire[0] = version;

        prop_assert_eq!(
            Frame::decode(&wire).unwrap_err(),
            ProtocolError::UnsupportedVersion(version)
        );
    }

    #[test]
    fn header_survives_any_field_values(
        msg_type in any::<u8>(),
        request_id in any::<u32>(),
        timestamp_ms in any::<f64>().prop_filter("finite", |v| v.is_finite()),
        payload_len in any::<u16>(),
    ) {
        let mut header = FrameHeader::new(msg_type);
        header.set_request_id(request_id);
        header.set_timestamp_ms(timestamp_ms);
        header.set_payload_len(payload_len);

        let parsed = *FrameHeader::from_bytes(&header.to_bytes()).unwrap();
        prop_assert_eq!(parsed.msg_type(), msg_type);
        prop_assert_eq!(parsed.request_id(), request_id);
        prop_assert_eq!(parsed.payload_len(), payload_len);
        prop_assert_eq!(parsed.timestamp_ms().to_bits(), timestamp_ms.to_bits());
    }
}
