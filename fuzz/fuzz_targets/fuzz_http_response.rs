//! Fuzz target: `client::http::parse_response`
//!
//! Feeds arbitrary bytes to the response parser and checks that it never
//! panics and never yields a body above the buffering limit.
//!
//! cargo fuzz run fuzz_http_response

#![no_main]

use libfuzzer_sys::fuzz_target;
use pourlogic::client::http::{self, MAX_BODY_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(resp) = http::parse_response(data) {
        assert!(resp.body.len() <= MAX_BODY_LEN, "body exceeds MAX_BODY_LEN");
        assert!(resp.status <= 999, "status must be three digits");
        if let Some(auth) = &resp.auth {
            // The signature field is always a suffix of the header value.
            assert!(auth.ends_with(http::signature_field(auth)));
        }
    }
});
