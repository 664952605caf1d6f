//! Fuzz target for the transfer frame codec
//!
//! Decoding arbitrary bytes must never panic, and anything that decodes must
//! survive a re-encode unchanged.

#![no_main]

use libfuzzer_sys::fuzz_target;
use xfer_transport::{decode_message, encode_message};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = decode_message(data) {
        let frame = encode_message(&message).expect("decoded message re-encodes");
        assert_eq!(decode_message(&frame).expect("re-encoded frame decodes"), message);
    }
});
