//! Session token codec.
//!
//! Tokens are compact JWS strings signed with an RSA private key. Anyone with
//! the published public key can check authenticity and expiry, but only the
//! holder of the private key can mint. Verification is pure and can run on any
//! number of requests concurrently.

mod claims;
mod jws;
pub mod keys;

pub use claims::Claims;
pub use keys::{check_key_pair, Algorithm, KeyPair};

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::error::{Error, Result};

/// Current wall clock in unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

#[derive(Debug, Clone)]
pub struct TokenCodec {
    keys: KeyPair,
    session_ttl: Duration,
}

impl TokenCodec {
    #[must_use]
    pub const fn new(keys: KeyPair, session_ttl: Duration) -> Self {
        Self { keys, session_ttl }
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.keys.algorithm()
    }

    #[must_use]
    pub const fn can_mint(&self) -> bool {
        self.keys.can_sign()
    }

    /// Sign `claims` with a fresh `iat`/`exp`.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for an empty subject, [`Error::Validation`] for
    /// a zero TTL, [`Error::Config`] when no private key is loaded.
    pub fn mint(&self, claims: &Claims, ttl: Duration) -> Result<String> {
        self.mint_at(claims, ttl, unix_now())
    }

    /// Mint with the configured session TTL.
    ///
    /// # Errors
    /// See [`TokenCodec::mint`].
    pub fn mint_session(&self, claims: &Claims) -> Result<String> {
        self.mint(claims, self.session_ttl)
    }

    /// [`TokenCodec::mint`] against an explicit clock.
    ///
    /// # Errors
    /// See [`TokenCodec::mint`].
    pub fn mint_at(&self, claims: &Claims, ttl: Duration, now: i64) -> Result<String> {
        if claims.username.trim().is_empty() {
            return Err(Error::unauthorized("Token subject is required"));
        }

        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        if ttl <= 0 {
            return Err(Error::validation("Token TTL must be positive"));
        }

        let private_key = self.keys.private_key()?;

        let mut claims = claims.identity();
        claims.iat = now;
        claims.exp = now.saturating_add(ttl);

        debug!(sub = %claims.username, exp = claims.exp, "Minting token");

        jws::sign(self.keys.algorithm(), private_key, &claims)
    }

    /// Check signature and expiry and return the embedded claims.
    ///
    /// # Errors
    /// [`Error::Malformed`], [`Error::InvalidSignature`] or [`Error::Expired`].
    pub fn verify(&self, token: &str) -> Result<Claims> {
        self.verify_at(token, unix_now())
    }

    /// [`TokenCodec::verify`] against an explicit clock.
    ///
    /// # Errors
    /// See [`TokenCodec::verify`].
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims> {
        let claims: Claims = jws::verify(self.keys.algorithm(), self.keys.public_key(), token)?;

        if claims.exp <= now {
            return Err(Error::Expired);
        }

        Ok(claims)
    }

    /// Public key in SPKI PEM form for third-party verifiers.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the key cannot be encoded.
    pub fn public_key_pem(&self) -> Result<String> {
        self.keys.public_key_pem()
    }
}
