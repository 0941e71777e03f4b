//! # Sesame (Session Tokens & Authorization Codes)
//!
//! `sesame` registers users, checks their credentials and hands out signed
//! session tokens that any service holding the public key can verify offline.
//!
//! ## Tokens
//!
//! Session tokens are compact JWS strings (`RS256`, `RS384` or `RS512`) carrying
//! the username, email, optional roles, `iat` and `exp`. They are signed, not
//! encrypted. The private and public keys are checked against each other once
//! at startup and the process refuses to serve if they disagree. With only a
//! public key configured the service runs verify-only.
//!
//! ## Authorization Codes
//!
//! A signed-in client can trade its session for a single-use code, pass the
//! code through a redirect, and let the receiving service redeem it for a fresh
//! token. Each code is redeemable exactly once and only within its TTL;
//! unredeemed codes are swept in the background.
//!
//! ## Storage
//!
//! Users live in `PostgreSQL` (`sql/schema.sql`) with argon2 password hashes.
//! An in-memory store is available for development and tests.

pub mod api;
pub mod cli;
pub mod error;
pub mod exchange;
pub mod store;
pub mod token;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
