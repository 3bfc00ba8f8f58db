//! Fuzz target: `drivers::rfid::FrameParser`
//!
//! Any byte stream may yield tags, but every tag must be exactly
//! `TAG_LEN` alphanumeric characters.
//!
//! cargo fuzz run fuzz_rfid_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use pourlogic::drivers::rfid::{FrameParser, TAG_LEN};

fuzz_target!(|data: &[u8]| {
    let mut parser = FrameParser::new();
    for &b in data {
        if let Some(tag) = parser.push(b) {
            assert_eq!(tag.len(), TAG_LEN);
            assert!(tag.bytes().all(|c| c.is_ascii_alphanumeric()));
        }
    }
});
