// ABOUTME: Random credential material and digest helpers
// ABOUTME: Generates opaque token bytes and SHA-256 digests for at-rest storage
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! Credential material generation
//!
//! Opaque credentials are random bytes from the OS RNG, rendered either as
//! lowercase hex (prefixed credentials) or base64url without padding
//! (first-party refresh tokens). Only SHA-256 digests of credentials are
//! persisted; the digest is the lookup key.

use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate `n` random bytes from the OS RNG
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate `hex_len / 2` random bytes rendered as lowercase hex
///
/// # Panics
///
/// Panics if `hex_len` is odd; callers pass compile-time constants.
#[must_use]
pub fn random_hex(hex_len: usize) -> String {
    assert!(hex_len % 2 == 0, "hex length must be even");
    hex::encode(random_bytes(hex_len / 2))
}

/// Generate 32 random bytes rendered as base64url without padding.
/// This is the first-party refresh-token format.
#[must_use]
pub fn random_base64url() -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(random_bytes(32))
}

/// SHA-256 digest rendered as lowercase hex
#[must_use]
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
