//! Fuzz target for the motion fast-path decoder.
//!
//! The fast path does manual offset arithmetic over the length-prefixed
//! name and the float block; truncation and length-prefix lies must all
//! surface as errors, never as panics or over-reads.

#![no_main]

use libfuzzer_sys::fuzz_target;
use motionbridge_proto::payloads::streaming::MotionPayload;

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = MotionPayload::decode(data) {
        let mut buf = Vec::new();
        let _ = payload.encode(&mut buf);
    }
});
