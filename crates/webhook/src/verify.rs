//! Event signature check.
//!
//! The platform signs each push as lowercase hex
//! `sha256(timestamp + nonce + encrypt_key + body)` in `X-Lark-Signature`.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const TIMESTAMP_HEADER: &str = "X-Lark-Request-Timestamp";
pub const NONCE_HEADER: &str = "X-Lark-Request-Nonce";
pub const SIGNATURE_HEADER: &str = "X-Lark-Signature";

pub fn expected_signature(timestamp: &str, nonce: &str, secret: &str, raw_body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(secret.as_bytes());
    hasher.update(raw_body);
    hex::encode(hasher.finalize())
}

/// A missing or empty secret accepts every request (open mode).
pub fn verify(
    timestamp: &str,
    nonce: &str,
    shared_secret: Option<&str>,
    raw_body: &[u8],
    signature: &str,
) -> bool {
    let Some(secret) = shared_secret.filter(|secret| !secret.is_empty()) else {
        return true;
    };

    let expected = expected_signature(timestamp, nonce, secret, raw_body);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

pub(crate) fn constant_time_eq(expected: &[u8], supplied: &[u8]) -> bool {
    // lengths are public
    if expected.len() != supplied.len() {
        return false;
    }
    expected.ct_eq(supplied).into()
}
