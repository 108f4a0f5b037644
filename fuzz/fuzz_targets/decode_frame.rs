#![no_main]

use libfuzzer_sys::fuzz_target;
use ws_core::FrameCodec;

// Arbitrary bytes must never panic the decoder, and a decode that succeeds on
// a prefix of the input must consume no more bytes than that prefix held.
fuzz_target!(|data: &[u8]| {
    let codec = FrameCodec::from_config(&ws_core::WebSocketConfig::default());

    match codec.decode(data) {
        Ok(Some((_, consumed))) => assert!(consumed <= data.len()),
        Ok(None) | Err(_) => {}
    }
});
