//! Fuzz target for the full frame/message decode path.
//!
//! Arbitrary network bytes must never panic the codec. Anything that
//! decodes cleanly must re-encode without error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use motionbridge_proto::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = Message::decode(data) {
        let _ = message.encode_to_vec();
    }
});
