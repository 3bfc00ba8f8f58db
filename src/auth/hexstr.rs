//! Hex text codec for signatures.
//!
//! Encoding is always lowercase.  Decoding is strict: even length,
//! `[0-9a-fA-F]` only, with an optional `0x`/`0X` prefix.

use core::fmt;

use super::DIGEST_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
    OddLength,
    InvalidChar,
    /// Decoded length differs from what the caller expected.
    WrongLength,
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OddLength => write!(f, "odd number of hex digits"),
            Self::InvalidChar => write!(f, "non-hex character"),
            Self::WrongLength => write!(f, "unexpected decoded length"),
        }
    }
}

impl From<hex::FromHexError> for HexError {
    fn from(e: hex::FromHexError) -> Self {
        match e {
            hex::FromHexError::OddLength => Self::OddLength,
            hex::FromHexError::InvalidHexCharacter { .. } => Self::InvalidChar,
            hex::FromHexError::InvalidStringLength => Self::WrongLength,
        }
    }
}

fn strip_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn encode_lower(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn decode(s: &str) -> Result<Vec<u8>, HexError> {
    Ok(hex::decode(strip_prefix(s))?)
}

/// Decode exactly one HMAC-SHA256 digest.
pub fn decode_digest(s: &str) -> Result<[u8; DIGEST_LEN], HexError> {
    let s = strip_prefix(s);
    if s.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    let mut out = [0u8; DIGEST_LEN];
    hex::decode_to_slice(s, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_lowercase() {
        assert_eq!(encode_lower(&[0xAB, 0x01, 0xFF]), "ab01ff");
        assert_eq!(encode_lower(&[]), "");
    }

    #[test]
    fn decodes_mixed_case_and_prefix() {
        assert_eq!(decode("aBcD").unwrap(), vec![0xAB, 0xCD]);
        assert_eq!(decode("0x0a").unwrap(), vec![0x0A]);
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(decode("abc"), Err(HexError::OddLength));
        assert_eq!(decode("zz"), Err(HexError::InvalidChar));
        assert_eq!(decode("0xg0"), Err(HexError::InvalidChar));
    }

    #[test]
    fn digest_requires_exact_length() {
        let hex64 = "00".repeat(32);
        assert_eq!(decode_digest(&hex64).unwrap(), [0u8; 32]);
        assert_eq!(decode_digest("00"), Err(HexError::WrongLength));
        assert_eq!(decode_digest(&"0".repeat(63)), Err(HexError::OddLength));
    }
}
