// ABOUTME: Cryptographic primitives for the token machinery
// ABOUTME: Password hashing, opaque token generation, PKCE verification, at_hash computation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Crypto Primitives
//!
//! Leaf module with no dependencies on the rest of the crate. Raw secrets
//! (authorization codes, refresh tokens, client secrets) are never stored:
//! callers persist only the [`hash_token`] digest and look rows up by it.
//! All secret comparisons go through [`timing_safe_compare`].

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

/// Byte length of opaque authorization codes and refresh tokens
pub const OPAQUE_TOKEN_BYTES: usize = 32;

/// Hash a password with bcrypt at the given cost factor
///
/// Cost is configurable so tests can run at a low cost while production uses
/// an adaptive one. Call sites on the request path wrap this in
/// `tokio::task::spawn_blocking`.
///
/// # Errors
/// Returns an error if bcrypt rejects the cost factor or input
pub fn hash_password(plaintext: &str, cost: u32) -> Result<String> {
    bcrypt::hash(plaintext, cost).map_err(|e| anyhow!("Failed to hash password: {e}"))
}

/// Verify a password against a stored bcrypt hash
///
/// # Errors
/// Returns an error if the stored hash is malformed
pub fn verify_password(plaintext: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(plaintext, hash).map_err(|e| anyhow!("Failed to verify password: {e}"))
}

/// Generate a URL-safe opaque token from `byte_length` random bytes
///
/// Base64url without padding, so the result is safe in query strings and
/// form bodies without further encoding.
#[must_use]
pub fn generate_token(byte_length: usize) -> String {
    let mut bytes = vec![0u8; byte_length];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Deterministic SHA-256 hex digest used as the lookup key for stored secrets
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison
///
/// Comparison time is independent of where the first mismatching byte occurs.
/// A length mismatch returns false immediately, which leaks length only;
/// acceptable here since compared values are fixed-length digests and tokens.
#[must_use]
pub fn timing_safe_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Compute the S256 code challenge for a PKCE verifier
#[must_use]
pub fn compute_s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verify a PKCE code verifier against a stored challenge
///
/// `S256` recomputes the challenge from the verifier; `plain` compares the
/// verifier directly. Both paths are timing-safe. Unknown methods fail closed.
#[must_use]
pub fn verify_code_challenge(verifier: &str, challenge: &str, method: &str) -> bool {
    match method {
        "S256" => timing_safe_compare(&compute_s256_challenge(verifier), challenge),
        "plain" => timing_safe_compare(verifier, challenge),
        _ => false,
    }
}

/// Compute the OIDC `at_hash` claim for an access token
///
/// Digest family follows the signing algorithm's bit strength (RS256 family
/// uses SHA-256 and so on); the claim is the base64url-encoded left half of
/// the digest.
///
/// # Errors
/// Returns an error for an unrecognized signing algorithm
pub fn compute_at_hash(access_token: &str, algorithm: &str) -> Result<String> {
    let digest: Vec<u8> = match algorithm {
        "RS256" | "ES256" | "PS256" | "HS256" => {
            Sha256::digest(access_token.as_bytes()).to_vec()
        }
        "RS384" | "ES384" | "PS384" | "HS384" => {
            Sha384::digest(access_token.as_bytes()).to_vec()
        }
        "RS512" | "ES512" | "PS512" | "HS512" => {
            Sha512::digest(access_token.as_bytes()).to_vec()
        }
        other => return Err(anyhow!("Unsupported signing algorithm: {other}")),
    };
    Ok(URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2]))
}
