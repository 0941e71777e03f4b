//! User persistence: registration, credential checks and login bookkeeping.
//!
//! The gateway only talks to [`CredentialStore`]; the backing store is chosen
//! at startup. Every I/O failure surfaces as [`Error::StoreUnavailable`] so a
//! broken database is never reported as bad credentials.

mod memory;
mod password;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use password::{hash_password, verify_password};
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    error::{Error, Result, UserField},
    token::Claims,
};

pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_EMAIL_LEN: usize = 255;

/// An authenticated user, as much of it as goes into a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn claims(&self) -> Claims {
        Claims::new(&self.username, &self.email).with_roles(self.roles.clone())
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an active user by email and check the password.
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Principal>>;

    async fn exists(&self, field: UserField, value: &str) -> Result<bool>;

    /// Insert a new active user with a freshly hashed password.
    ///
    /// Uniqueness is enforced here as well as by callers' `exists` checks, so
    /// two racing registrations cannot both succeed.
    async fn create(&self, username: &str, email: &str, password: &str) -> Result<Principal>;

    /// Bump the login counter and last-login timestamp.
    async fn record_login(&self, user_id: i64) -> Result<()>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<()>;
}

/// Emails compare case-insensitively.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn check_lengths(username: &str, email: &str) -> Result<()> {
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(Error::validation("Invalid username format"));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(Error::validation("Invalid email format"));
    }
    Ok(())
}
