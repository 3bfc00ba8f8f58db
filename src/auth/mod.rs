//! Request authentication: counter-based one-time passwords over HMAC-SHA256.
//!
//! Every exchange with the server is signed with a key derived from a
//! shared passphrase:
//!
//! 1. `key = SHA-256(passphrase)`, computed once
//! 2. the client increments its persistent [`counter::OtpCounter`]
//! 3. it signs `COUNTER "\n" REQUEST-LINE "\n" BODY` and sends
//!    `X-PourLogic-Auth: <client_id>:<counter>:<hex>`
//! 4. the server signs `COUNTER "\n" STATUS "\n" BODY` with the same
//!    counter; the client recomputes that from its own counter value
//!
//! Crypto is handled by the `hmac-sha256` crate: pure Rust, no_std,
//! constant-time verification, identical on ESP-IDF and host targets.

pub mod counter;
pub mod hexstr;

use core::fmt;

/// HMAC-SHA256 output size.
pub const DIGEST_LEN: usize = 32;

/// Header carrying the signature in both directions.
pub const AUTH_HEADER: &str = "X-PourLogic-Auth";

/// Passphrase used when none has been provisioned.
pub const DEFAULT_PASSPHRASE: &str = "secret";

// ── Shared key ───────────────────────────────────────────────

/// HMAC key shared with the server.
#[derive(Clone)]
pub struct SharedKey([u8; DIGEST_LEN]);

impl SharedKey {
    /// `SHA-256(passphrase)`.
    pub fn derive(passphrase: &[u8]) -> Self {
        Self(hmac_sha256::Hash::hash(passphrase))
    }

    pub fn sign(&self, message: &[u8]) -> [u8; DIGEST_LEN] {
        hmac_sha256::HMAC::mac(message, self.0)
    }

    /// Constant-time comparison against a received tag.
    pub fn verify(&self, message: &[u8], tag: &[u8; DIGEST_LEN]) -> bool {
        hmac_sha256::HMAC::verify(message, self.0, tag)
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

// ── Canonical signing inputs ─────────────────────────────────

/// Client-side input: `COUNTER\nREQUEST-LINE\nBODY`.
///
/// The request line is the HTTP request line without its CRLF.  `body`
/// is empty for GET requests, in which case the input still ends in `\n`.
pub fn request_message(counter: u32, request_line: &str, body: &str) -> String {
    format!("{counter}\n{request_line}\n{body}")
}

/// Server-side input: `COUNTER\nSTATUS\nBODY`.
pub fn response_message(counter: u32, status: u16, body: &str) -> String {
    format!("{counter}\n{status}\n{body}")
}

// ── Header value ─────────────────────────────────────────────

/// Value of the outbound `X-PourLogic-Auth` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthHeader {
    pub client_id: u32,
    pub counter: u32,
    pub signature: [u8; DIGEST_LEN],
}

impl fmt::Display for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.client_id,
            self.counter,
            hexstr::encode_lower(&self.signature)
        )
    }
}
