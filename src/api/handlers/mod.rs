//! HTTP handlers for the session gateway.
//!
//! Handlers receive their collaborators through `Extension` layers: the
//! [`TokenCodec`](crate::token::TokenCodec), the
//! [`CodeExchange`](crate::exchange::CodeExchange), the credential store and
//! the [`SessionConfig`].

pub mod authorization_code;
pub mod create_account;
pub mod health;
pub mod login;
pub mod protected;
pub mod public_key;
pub mod session;
pub mod state;
pub mod verify_token;

pub use state::{parse_origin, SessionConfig, ACCESS_TOKEN_COOKIE};
