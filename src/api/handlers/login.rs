use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

use super::{session::session_cookie, state::SessionConfig};
use crate::{
    error::{Error, Result},
    store::CredentialStore,
    token::TokenCodec,
};

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    email: Option<String>,
    #[schema(format = Password)]
    password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Session token issued and set as cookie", body = LoginResponse),
        (status = 400, description = "Missing email or password"),
        (status = 401, description = "Incorrect email or password"),
        (status = 503, description = "Credential store unavailable"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    store: Extension<Arc<dyn CredentialStore>>,
    codec: Extension<Arc<TokenCodec>>,
    config: Extension<Arc<SessionConfig>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse> {
    let Some(Json(request)) = payload else {
        return Err(Error::validation("Missing payload"));
    };

    let (Some(email), Some(password)) = (request.email, request.password) else {
        return Err(Error::validation("Email and password are required"));
    };
    if email.trim().is_empty() || password.is_empty() {
        return Err(Error::validation("Email and password are required"));
    }

    let Some(principal) = store.authenticate(email.trim(), &password).await? else {
        debug!("Rejected login");
        return Err(Error::unauthorized("Incorrect username or password"));
    };

    let access_token = codec.mint_session(&principal.claims())?;

    let mut headers = HeaderMap::new();
    match session_cookie(&config, &access_token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {}", err),
    }

    // The token is already minted; a failed counter update must not undo the login.
    if let Err(err) = store.record_login(principal.id).await {
        warn!(user_id = principal.id, "Failed to record login: {}", err);
    }

    debug!(user_id = principal.id, "Login succeeded");

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "bearer".to_string(),
        }),
    ))
}
