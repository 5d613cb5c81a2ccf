//! Content hashing primitives.
//!
//! Every chunk and file identity in the store is the Keccak-256 digest of its
//! bytes, rendered as lowercase hex. Producer and consumer must agree on this
//! single primitive for dedup and tamper detection to hold.

use sha3::{Digest, Keccak256};
use thiserror::Error;

/// A 32-byte content digest.
pub type ContentDigest = [u8; 32];

#[derive(Error, Debug)]
pub enum HashError {
    #[error("invalid hex digest: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid digest length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Compute the Keccak-256 digest of a byte slice.
pub fn keccak256(data: &[u8]) -> ContentDigest {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Compute the Keccak-256 digest over multiple slices as one message.
pub fn keccak256_concat(parts: &[&[u8]]) -> ContentDigest {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Hash a byte slice and render the digest as a lowercase hex id.
pub fn hex_digest(data: &[u8]) -> String {
    hex::encode(keccak256(data))
}

/// Render an existing digest as a hex id.
pub fn digest_to_hex(digest: &ContentDigest) -> String {
    hex::encode(digest)
}

/// Parse a hex id back into a digest.
pub fn parse_digest(s: &str) -> Result<ContentDigest, HashError> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err(HashError::InvalidLength(bytes.len()));
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes);
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(keccak256(b"hello"), keccak256(b"hello"));
        assert_ne!(keccak256(b"hello"), keccak256(b"hellp"));
    }

    #[test]
    fn test_known_vector() {
        // Keccak-256 of the empty string
        assert_eq!(
            hex_digest(b""),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_concat_equals_contiguous() {
        assert_eq!(keccak256_concat(&[b"foo", b"bar"]), keccak256(b"foobar"));
    }

    #[test]
    fn test_hex_round_trip() {
        let digest = keccak256(b"some chunk");
        let parsed = parse_digest(&digest_to_hex(&digest)).unwrap();
        assert_eq!(parsed, digest);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_digest("zz").is_err());
        assert!(parse_digest("abcd").is_err());
    }
}
