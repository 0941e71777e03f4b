//! Error taxonomy shared by the token codec, the code exchange, the credential
//! store and the HTTP gateway.
//!
//! Every variant maps to a stable machine-checkable [`Error::kind`] and an HTTP
//! status. Sources are logged but never serialized back to the caller.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Which unique column a registration conflicted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Username,
    Email,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{}", duplicate_message(.0))]
    DuplicateField(UserField),
    #[error("{0}")]
    Validation(String),
    #[error("Invalid authorization code")]
    CodeNotFound,
    #[error("private and public keys do not match")]
    KeyMismatch,
    #[error("credential store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

fn duplicate_message(field: &UserField) -> &'static str {
    match field {
        UserField::Username => "Username already exists",
        UserField::Email => "Email already exists",
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Stable identifier for the failure, safe to match on in clients.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::Unauthorized(_) => "unauthorized",
            Self::DuplicateField(_) => "duplicate_field",
            Self::Validation(_) => "validation_error",
            Self::CodeNotFound => "code_not_found",
            Self::KeyMismatch => "key_mismatch",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Config(_) => "config_error",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Malformed | Self::InvalidSignature | Self::Expired | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::DuplicateField(_) | Self::Validation(_) | Self::CodeNotFound => {
                StatusCode::BAD_REQUEST
            }
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::KeyMismatch | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to clients; server-side failures get a generic text.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Malformed | Self::InvalidSignature | Self::Expired => {
                "Invalid or expired token".to_string()
            }
            Self::StoreUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::KeyMismatch | Self::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "request failed: {self:?}");
        }

        let body = ErrorBody {
            error: self.kind(),
            detail: self.detail(),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
