//! Cookie and bearer plumbing for session tokens.

use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};

use super::state::{SessionConfig, ACCESS_TOKEN_COOKIE};
use crate::{
    error::{Error, Result},
    token::{Claims, TokenCodec},
};

/// Build the `HttpOnly` cookie carrying the session token.
pub(super) fn session_cookie(
    config: &SessionConfig,
    token: &str,
) -> std::result::Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{ACCESS_TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_max_age_seconds()
    );
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer header first, then the session cookie.
pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    extract_cookie_token(headers)
}

fn extract_cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            let val = val.trim();
            (key.trim() == ACCESS_TOKEN_COOKIE && !val.is_empty()).then(|| val.to_string())
        })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Verify whatever token the request carries.
pub(super) fn authenticated_claims(headers: &HeaderMap, codec: &TokenCodec) -> Result<Claims> {
    let token = extract_session_token(headers)
        .ok_or_else(|| Error::unauthorized("Could not validate credentials"))?;
    codec.verify(&token)
}
