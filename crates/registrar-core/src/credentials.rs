//! # Credentials
//!
//! Bearer tokens for API access.
//!
//! A token is 32 random bytes, URL-safe base64 encoded with a `reg_` prefix.
//! Only the blake3 hash of a token is stored. Verification compares hashes
//! in constant time.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 32;

/// Prefix that makes tokens easy to spot in logs and secret scanners.
pub const TOKEN_PREFIX: &str = "reg_";

/// Generate a fresh plaintext token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Hex-encoded blake3 hash of a token.
#[must_use]
pub fn hash_token(token: &str) -> String {
    blake3::hash(token.trim().as_bytes()).to_hex().to_string()
}

/// Check a plaintext token against a stored hash.
#[must_use]
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    let candidate = hash_token(token);
    candidate.as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
