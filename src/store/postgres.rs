//! PostgreSQL-backed [`CredentialStore`]. Schema lives in `sql/schema.sql`.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Connection, PgPool, Row};
use std::time::Duration;
use tracing::{debug, error, info_span, Instrument};

use super::{
    check_lengths, hash_password, normalize_email, verify_password, CredentialStore, Principal,
};
use crate::error::{Error, Result, UserField};

fn unavailable(err: impl Into<anyhow::Error>) -> Error {
    let err = err.into();
    error!("Credential store error: {:#}", err);
    Error::StoreUnavailable(err)
}

/// Which unique column a SQLSTATE `23505` violated, if any.
fn unique_violation(err: &sqlx::Error) -> Option<UserField> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            match db_err.constraint() {
                Some(constraint) if constraint.contains("username") => Some(UserField::Username),
                _ => Some(UserField::Email),
            }
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a small pool against `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        let query = r"
            SELECT u.id, u.username, u.email, u.password_hash, u.is_active,
                   COALESCE(
                       array_agg(r.name::text) FILTER (WHERE r.name IS NOT NULL),
                       '{}'::text[]
                   ) AS roles
            FROM user_info u
            LEFT JOIN user_roles ur ON ur.user_id = u.id
            LEFT JOIN roles r ON r.id = ur.role_id
            WHERE u.email = $1
            GROUP BY u.id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let is_active: bool = row.try_get("is_active").map_err(unavailable)?;
        if !is_active {
            debug!("Login attempt for inactive user");
            return Ok(None);
        }

        let password_hash: String = row.try_get("password_hash").map_err(unavailable)?;
        let password = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
                .await
                .map_err(unavailable)?;
        if !verified {
            return Ok(None);
        }

        Ok(Some(Principal {
            id: row.try_get("id").map_err(unavailable)?,
            username: row.try_get("username").map_err(unavailable)?,
            email: row.try_get("email").map_err(unavailable)?,
            roles: row.try_get("roles").map_err(unavailable)?,
        }))
    }

    async fn exists(&self, field: UserField, value: &str) -> Result<bool> {
        let (query, value) = match field {
            UserField::Username => (
                "SELECT EXISTS(SELECT 1 FROM user_info WHERE username = $1) AS exists",
                value.to_string(),
            ),
            UserField::Email => (
                "SELECT EXISTS(SELECT 1 FROM user_info WHERE email = $1) AS exists",
                normalize_email(value),
            ),
        };
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(value)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(unavailable)?;

        row.try_get("exists").map_err(unavailable)
    }

    async fn create(&self, username: &str, email: &str, password: &str) -> Result<Principal> {
        let email = normalize_email(email);
        check_lengths(username, &email)?;

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(unavailable)??;

        let query = r"
            INSERT INTO user_info (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .bind(&email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| match unique_violation(&err) {
                Some(field) => Error::DuplicateField(field),
                None => unavailable(err),
            })?;

        let id: i64 = row.try_get("id").map_err(unavailable)?;
        debug!(user_id = id, "Created user");

        Ok(Principal {
            id,
            username: username.to_string(),
            email,
            roles: Vec::new(),
        })
    }

    async fn record_login(&self, user_id: i64) -> Result<()> {
        let query = r"
            UPDATE user_info
            SET number_of_logins = number_of_logins + 1,
                last_login = NOW(),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(unavailable)?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(unavailable)?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await.map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert_eq!(unique_violation(&sqlx::Error::RowNotFound), None);
        assert_eq!(unique_violation(&sqlx::Error::PoolTimedOut), None);
    }

    #[test]
    fn store_errors_map_to_unavailable() {
        let err = unavailable(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[tokio::test]
    async fn unreachable_database_reports_unavailable() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://sesame@127.0.0.1:1/sesame");
        let Ok(pool) = pool else {
            return;
        };
        let store = PgCredentialStore::new(pool);

        assert!(matches!(store.ping().await, Err(Error::StoreUnavailable(_))));
        assert!(matches!(
            store.authenticate("alice@example.com", "password123").await,
            Err(Error::StoreUnavailable(_))
        ));
    }
}
