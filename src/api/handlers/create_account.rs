//! Account registration.
//!
//! Input checks run in a fixed order and all of them complete before the
//! credential store is consulted, so malformed requests never reach the
//! database.

use axum::{extract::Extension, response::IntoResponse, Json};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};
use utoipa::ToSchema;

use crate::{
    error::{Error, Result, UserField},
    store::CredentialStore,
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct CreateAccountRequest {
    username: Option<String>,
    email: Option<String>,
    #[schema(format = Password)]
    password: Option<String>,
    #[serde(rename = "confirmedPassword")]
    #[schema(format = Password)]
    confirmed_password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateAccountResponse {
    pub message: String,
}

/// A request that passed every local check.
#[derive(Debug, PartialEq, Eq)]
struct NewAccount {
    username: String,
    email: String,
    password: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

// Whitespace counts as password content.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

fn username_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]{1,50}$").ok())
        .as_ref()
}

pub fn valid_username(username: &str) -> bool {
    username_pattern().is_some_and(|re| re.is_match(username))
}

pub fn valid_email(email: &str) -> bool {
    email.chars().count() >= 5 && email.contains('@') && email.contains('.')
}

fn validate(request: CreateAccountRequest) -> Result<NewAccount> {
    let (Some(email), Some(password), Some(confirmed)) = (
        non_blank(request.email),
        present(request.password),
        present(request.confirmed_password),
    ) else {
        return Err(Error::validation("Email and password are required"));
    };

    let Some(username) = non_blank(request.username) else {
        return Err(Error::validation("Username is required"));
    };

    if password != confirmed {
        return Err(Error::validation("Passwords do not match"));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let email = email.trim().to_string();
    if !valid_email(&email) {
        return Err(Error::validation("Invalid email format"));
    }

    let username = username.trim().to_string();
    if !valid_username(&username) {
        return Err(Error::validation("Invalid username format"));
    }

    Ok(NewAccount {
        username,
        email,
        password,
    })
}

#[utoipa::path(
    post,
    path = "/create-account",
    request_body = CreateAccountRequest,
    responses (
        (status = 200, description = "Account created", body = CreateAccountResponse),
        (status = 400, description = "Invalid input, or email/username already registered"),
        (status = 503, description = "Credential store unavailable"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn create_account(
    store: Extension<Arc<dyn CredentialStore>>,
    payload: Option<Json<CreateAccountRequest>>,
) -> Result<impl IntoResponse> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let account = validate(request)?;

    if store.exists(UserField::Email, &account.email).await? {
        return Err(Error::DuplicateField(UserField::Email));
    }
    if store.exists(UserField::Username, &account.username).await? {
        return Err(Error::DuplicateField(UserField::Username));
    }

    let principal = store
        .create(&account.username, &account.email, &account.password)
        .await?;

    debug!(user_id = principal.id, "Account created");

    Ok(Json(CreateAccountResponse {
        message: "User created successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        username: &str,
        email: &str,
        password: &str,
        confirmed: &str,
    ) -> CreateAccountRequest {
        let field = |value: &str| Some(value.to_string());
        CreateAccountRequest {
            username: field(username),
            email: field(email),
            password: field(password),
            confirmed_password: field(confirmed),
        }
    }

    fn message(result: Result<NewAccount>) -> String {
        match result {
            Err(Error::Validation(message)) => message,
            other => format!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_request() -> Result<()> {
        let account = validate(request(
            "alice",
            "alice@example.com",
            "password123",
            "password123",
        ))?;
        assert_eq!(
            account,
            NewAccount {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "password123".to_string(),
            }
        );
        Ok(())
    }

    #[test]
    fn rules_apply_in_order() {
        assert_eq!(
            message(validate(CreateAccountRequest::default())),
            "Email and password are required"
        );
        assert_eq!(
            message(validate(request("", "a@b.co", "password123", "password123"))),
            "Username is required"
        );
        // Mismatch is reported before the length rule.
        assert_eq!(
            message(validate(request("alice", "a@b.co", "short1", "short2"))),
            "Passwords do not match"
        );
        assert_eq!(
            message(validate(request("alice", "a@b.co", "short1", "short1"))),
            "Password must be at least 8 characters long"
        );
        assert_eq!(
            message(validate(request("alice", "a@b", "password123", "password123"))),
            "Invalid email format"
        );
        assert_eq!(
            message(validate(request("alice", "é@.x", "password123", "password123"))),
            "Invalid email format"
        );
        assert_eq!(
            message(validate(request("al ice", "a@b.co", "password123", "password123"))),
            "Invalid username format"
        );
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("alice_01.dev-x"));
        assert!(valid_username(&"a".repeat(50)));
        assert!(!valid_username(&"a".repeat(51)));
        assert!(!valid_username("alice!"));
        assert!(!valid_username(""));
    }

    #[test]
    fn email_rules() {
        assert!(valid_email("a@b.co"));
        assert!(!valid_email("a@b"));
        assert!(!valid_email("alice.example.com"));
        assert!(!valid_email("alice@example"));
        // Four characters, five bytes.
        assert!(!valid_email("é@.x"));
    }

    #[test]
    fn whitespace_password_is_present() -> Result<()> {
        assert_eq!(
            message(validate(request("alice", "a@b.co", "   ", "   "))),
            "Password must be at least 8 characters long"
        );
        let account = validate(request("alice", "a@b.co", "        ", "        "))?;
        assert_eq!(account.password, "        ");
        assert_eq!(
            message(validate(request("alice", "a@b.co", "", ""))),
            "Email and password are required"
        );
        Ok(())
    }
}
