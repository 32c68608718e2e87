// ABOUTME: RSA key management, JWT signing/verification, and JWKS publication
// ABOUTME: One process-lifetime signing key with an RFC 7638 thumbprint key ID
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Async-IO.org

//! # Key Management
//!
//! Loads the RSA signing keypair once at startup; the server refuses to bind
//! its listening socket if key material is absent or invalid. The derived
//! JWKS is immutable for the process lifetime (key rotation is out of scope)
//! and never includes private material.
//!
//! ## Security Model
//!
//! - Private keys never leave the server
//! - Public key distributed via `/.well-known/jwks.json`
//! - `kid` is the RFC 7638 JWK thumbprint, stable across restarts for the
//!   same key material

use crate::config::ServerConfig;
use crate::models::{AccessTokenClaims, IdTokenClaims};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroizing;

/// RSA key size in bits for production key generation
const RSA_KEY_SIZE: usize = 2048;

/// JWT `typ` header for access tokens (RFC 9068)
pub const ACCESS_TOKEN_TYP: &str = "at+jwt";

/// JWT `typ` header for ID tokens
pub const ID_TOKEN_TYP: &str = "JWT";

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID (RFC 7638 thumbprint)
    pub kid: String,
    /// Signing algorithm
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// RSA key pair with its derived key ID
pub struct RsaKeyPair {
    /// RFC 7638 thumbprint of the public key
    pub kid: String,
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a new RSA key pair
    ///
    /// Use 2048 bits everywhere; larger keys add latency to every token
    /// issuance without changing the trust model for first-party clients.
    ///
    /// # Errors
    /// Returns an error if key generation fails
    pub fn generate(key_size_bits: usize) -> Result<Self> {
        use rand::rngs::OsRng;

        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, key_size_bits)
            .map_err(|e| anyhow!("Failed to generate RSA private key: {e}"))?;

        Self::from_private_key(private_key)
    }

    /// Import a private key from PKCS#8 PEM
    ///
    /// # Errors
    /// Returns an error if PEM parsing fails
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| anyhow!("Failed to parse private key PEM: {e}"))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let public_key = RsaPublicKey::from(&private_key);
        let kid = thumbprint(&public_key);

        Ok(Self {
            kid,
            private_key,
            public_key,
        })
    }

    /// Convert the public key to JWK format
    #[must_use]
    pub fn to_jwk(&self, alg: &str) -> JsonWebKey {
        let (n, e) = modulus_exponent(&self.public_key);
        JsonWebKey {
            kty: "RSA".to_string(),
            key_use: "sig".to_string(),
            kid: self.kid.clone(),
            alg: alg.to_string(),
            n,
            e,
        }
    }

    /// Export the private key as PEM
    ///
    /// # Errors
    /// Returns an error if PEM encoding fails
    pub fn export_private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map(|pem| Zeroizing::new(pem.to_string()))
            .map_err(|e| anyhow!("Failed to export private key as PEM: {e}"))
    }

    /// Export the public key as PEM
    ///
    /// # Errors
    /// Returns an error if PEM encoding fails
    pub fn export_public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| anyhow!("Failed to export public key as PEM: {e}"))
    }

    /// Encoding key for JWT signing
    ///
    /// # Errors
    /// Returns an error if PEM export or encoding key creation fails
    pub fn encoding_key(&self) -> Result<EncodingKey> {
        let pem = self.export_private_key_pem()?;
        EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow!("Failed to create encoding key: {e}"))
    }

    /// Decoding key for JWT verification
    ///
    /// # Errors
    /// Returns an error if PEM export or decoding key creation fails
    pub fn decoding_key(&self) -> Result<DecodingKey> {
        let pem = self.export_public_key_pem()?;
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| anyhow!("Failed to create decoding key: {e}"))
    }
}

fn modulus_exponent(public_key: &RsaPublicKey) -> (String, String) {
    let n_bytes = public_key.n().to_bytes_be();
    let e_bytes = public_key.e().to_bytes_be();
    (
        URL_SAFE_NO_PAD.encode(&n_bytes),
        URL_SAFE_NO_PAD.encode(&e_bytes),
    )
}

/// Confirm a configured public key PEM belongs to the loaded signing key
fn check_public_key(key_pair: &RsaKeyPair, public_pem: &str) -> Result<()> {
    let configured = RsaPublicKey::from_public_key_pem(public_pem)
        .map_err(|e| anyhow!("JWT_PUBLIC_KEY is not valid PEM: {e}"))?;

    if configured != key_pair.public_key {
        return Err(anyhow!("JWT_PUBLIC_KEY does not match JWT_SIGNING_KEY"));
    }

    Ok(())
}

/// RFC 7638 JWK thumbprint: SHA-256 over the required members in
/// lexicographic order, base64url encoded
fn thumbprint(public_key: &RsaPublicKey) -> String {
    let (n, e) = modulus_exponent(public_key);
    let canonical = format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

/// Key manager owning the signing key for the process lifetime
///
/// Constructed once at startup (fail-fast) and shared into every handler via
/// the server context; all methods take `&self` and are safe for concurrent
/// use.
pub struct KeyManager {
    key_pair: RsaKeyPair,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    algorithm_name: String,
    issuer: String,
}

impl KeyManager {
    /// Build the key manager from configuration
    ///
    /// Loads `JWT_SIGNING_KEY` PEM when present. In development a missing key
    /// falls back to a generated ephemeral keypair; in production it is a
    /// fatal startup error. A configured `JWT_PUBLIC_KEY` must match the key
    /// derived from the private half.
    ///
    /// # Errors
    /// Returns an error on missing/invalid/mismatched key material or an
    /// unsupported algorithm
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let key_pair = match &config.tokens.signing_key_pem {
            Some(pem) => RsaKeyPair::from_pem(pem).context("JWT_SIGNING_KEY is not valid PEM")?,
            None if config.environment.is_production() => {
                return Err(anyhow!("JWT_SIGNING_KEY is required in production"));
            }
            None => {
                warn!("JWT_SIGNING_KEY not set; generating an ephemeral development keypair");
                RsaKeyPair::generate(RSA_KEY_SIZE)?
            }
        };

        if let Some(public_pem) = &config.tokens.public_key_pem {
            check_public_key(&key_pair, public_pem)?;
        }

        Self::new(key_pair, &config.tokens.algorithm, &config.issuer_url)
    }

    /// Build the key manager from an explicit key pair
    ///
    /// # Errors
    /// Returns an error if the algorithm is unsupported or key material
    /// cannot be converted for signing
    pub fn new(key_pair: RsaKeyPair, algorithm: &str, issuer: &str) -> Result<Self> {
        let alg: Algorithm = algorithm
            .parse()
            .map_err(|_| anyhow!("Unsupported JWT algorithm: {algorithm}"))?;
        if !matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
            return Err(anyhow!("Only RSA signing algorithms are supported, got {algorithm}"));
        }

        let encoding_key = key_pair.encoding_key()?;
        let decoding_key = key_pair.decoding_key()?;

        Ok(Self {
            key_pair,
            encoding_key,
            decoding_key,
            algorithm: alg,
            algorithm_name: algorithm.to_string(),
            issuer: issuer.to_string(),
        })
    }

    /// Name of the configured signing algorithm
    #[must_use]
    pub fn algorithm_name(&self) -> &str {
        &self.algorithm_name
    }

    /// Key ID of the active signing key
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.key_pair.kid
    }

    /// Sign access token claims with `typ: at+jwt`
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn sign_access_token(&self, claims: &AccessTokenClaims) -> Result<String> {
        self.sign(claims, ACCESS_TOKEN_TYP)
    }

    /// Sign ID token claims with `typ: JWT`
    ///
    /// # Errors
    /// Returns an error if JWT encoding fails
    pub fn sign_id_token(&self, claims: &IdTokenClaims) -> Result<String> {
        self.sign(claims, ID_TOKEN_TYP)
    }

    fn sign<T: Serialize>(&self, claims: &T, typ: &str) -> Result<String> {
        let mut header = Header::new(self.algorithm);
        header.typ = Some(typ.to_string());
        header.kid = Some(self.key_pair.kid.clone());

        encode(&header, claims, &self.encoding_key)
            .map_err(|e| anyhow!("Failed to encode JWT: {e}"))
    }

    /// Verify an access token: signature, issuer, audience, expiry, and the
    /// `at+jwt` type header
    ///
    /// # Errors
    /// Returns an error on any mismatch, expiry, or malformed structure
    pub fn verify_access_token(
        &self,
        token: &str,
        expected_audience: &str,
    ) -> Result<AccessTokenClaims> {
        let header =
            decode_header(token).map_err(|e| anyhow!("Failed to decode JWT header: {e}"))?;

        if header.typ.as_deref() != Some(ACCESS_TOKEN_TYP) {
            return Err(anyhow!("JWT typ header is not {ACCESS_TOKEN_TYP}"));
        }
        if header.kid.as_deref() != Some(self.key_pair.kid.as_str()) {
            return Err(anyhow!("Unknown key ID in JWT header"));
        }

        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[expected_audience]);

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| anyhow!("Failed to verify JWT: {e}"))?;

        Ok(token_data.claims)
    }

    /// Public JWKS for distribution; never includes private material
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.key_pair.to_jwk(&self.algorithm_name)],
        }
    }
}
