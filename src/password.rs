// ABOUTME: Password hashing with argon2id and multi-format legacy verification
// ABOUTME: Dispatches on the stored hash's self-describing prefix and supports progressive upgrade
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.

//! # Password Hashing & Upgrade
//!
//! New hashes are always argon2id (64 MiB, 3 iterations, 2 lanes, 16-byte
//! salt, 32-byte key, PHC string). Stored hashes self-describe their format:
//!
//! - `$2a$` / `$2b$` / `$2y$` — bcrypt
//! - `$argon2id$` — argon2id PHC
//! - `$firebase-scrypt$` — a tagged legacy scrypt variant carried over from
//!   an earlier import, parameters serialized in the tag
//!
//! A successful verification against a non-argon2id hash is the trigger for
//! a best-effort rehash (see the identity service).

use anyhow::{anyhow, bail, Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordVerifier, Version};
use base64::{engine::general_purpose, Engine as _};
use subtle::ConstantTimeEq;

/// Argon2id memory cost in KiB (64 MiB)
const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
/// Argon2id iteration count
const ARGON2_ITERATIONS: u32 = 3;
/// Argon2id parallelism
const ARGON2_LANES: u32 = 2;
/// Derived key length in bytes
const ARGON2_KEY_LEN: usize = 32;

fn argon2_instance() -> Result<Argon2<'static>> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_LANES,
        Some(ARGON2_KEY_LEN),
    )
    .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with argon2id, returning a PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2_instance()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("argon2 hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash, dispatching on its format prefix.
///
/// Returns `Ok(true)` on a match, `Ok(false)` on a clean mismatch, and an
/// error only for unsupported or malformed hash strings.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    if stored.starts_with("$2a$") || stored.starts_with("$2b$") || stored.starts_with("$2y$") {
        return bcrypt::verify(password, stored).context("bcrypt verification failed");
    }
    if stored.starts_with("$argon2id$") {
        let parsed =
            PasswordHash::new(stored).map_err(|e| anyhow!("malformed argon2id hash: {e}"))?;
        // Parameters come from the PHC string itself; comparison is
        // constant-time inside the verifier.
        return Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok());
    }
    if let Some(tag) = stored.strip_prefix("$firebase-scrypt$") {
        return verify_legacy_scrypt(password, tag);
    }
    bail!("unsupported hash format")
}

/// Whether a stored hash should be upgraded to argon2id after a successful
/// verification
#[must_use]
pub fn needs_rehash(stored: &str) -> bool {
    !stored.starts_with("$argon2id$")
}

/// Verify the tagged legacy scrypt variant:
/// `n=<log2 N>,r=<r>,p=<p>$<salt b64url-nopad>$<key b64url-nopad>`
fn verify_legacy_scrypt(password: &str, tag: &str) -> Result<bool> {
    let mut parts = tag.splitn(3, '$');
    let params_part = parts.next().ok_or_else(|| anyhow!("missing scrypt params"))?;
    let salt_part = parts.next().ok_or_else(|| anyhow!("missing scrypt salt"))?;
    let key_part = parts.next().ok_or_else(|| anyhow!("missing scrypt key"))?;

    let (mut log_n, mut r, mut p) = (None, None, None);
    for kv in params_part.split(',') {
        match kv.split_once('=') {
            Some(("n", v)) => log_n = Some(v.parse::<u8>().context("scrypt n")?),
            Some(("r", v)) => r = Some(v.parse::<u32>().context("scrypt r")?),
            Some(("p", v)) => p = Some(v.parse::<u32>().context("scrypt p")?),
            _ => bail!("unrecognized scrypt parameter: {kv}"),
        }
    }
    let (log_n, r, p) = (
        log_n.ok_or_else(|| anyhow!("scrypt n missing"))?,
        r.ok_or_else(|| anyhow!("scrypt r missing"))?,
        p.ok_or_else(|| anyhow!("scrypt p missing"))?,
    );

    let salt = general_purpose::URL_SAFE_NO_PAD
        .decode(salt_part)
        .context("scrypt salt is not base64url")?;
    let expected = general_purpose::URL_SAFE_NO_PAD
        .decode(key_part)
        .context("scrypt key is not base64url")?;

    let params = scrypt::Params::new(log_n, r, p, expected.len())
        .map_err(|e| anyhow!("invalid scrypt parameters: {e}"))?;
    let mut derived = vec![0u8; expected.len()];
    scrypt::scrypt(password.as_bytes(), &salt, &params, &mut derived)
        .map_err(|e| anyhow!("scrypt derivation failed: {e}"))?;

    Ok(derived.ct_eq(&expected).into())
}

/// Build a bcrypt hash. The login path never writes bcrypt; this exists for
/// data-import tooling and upgrade-path fixtures.
pub fn hash_password_bcrypt(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).context("bcrypt hashing failed")
}

/// Build a legacy-format hash string. The login path never writes this
/// format; this exists for data-import tooling and upgrade-path fixtures.
pub fn hash_legacy_scrypt(password: &str) -> Result<String> {
    let salt = crate::crypto::random_bytes(16);
    let params = scrypt::Params::new(13, 8, 1, 32).map_err(|e| anyhow!("scrypt params: {e}"))?;
    let mut key = vec![0u8; 32];
    scrypt::scrypt(password.as_bytes(), &salt, &params, &mut key)
        .map_err(|e| anyhow!("scrypt derivation failed: {e}"))?;
    Ok(format!(
        "$firebase-scrypt$n=13,r=8,p=1${}${}",
        general_purpose::URL_SAFE_NO_PAD.encode(salt),
        general_purpose::URL_SAFE_NO_PAD.encode(key)
    ))
}
