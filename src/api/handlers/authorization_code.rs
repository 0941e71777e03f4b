//! One-time code hand-off for redirects to sibling services.

use axum::{
    extract::{Extension, Query},
    http::{header::CACHE_CONTROL, HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

use super::{session::authenticated_claims, state::SessionConfig};
use crate::{
    error::{Error, Result},
    exchange::CodeExchange,
    token::TokenCodec,
};

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct IssueParams {
    /// Host (or URL) the code will be delivered to.
    redirect_uri: Option<String>,
}

#[derive(IntoParams, Deserialize, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct RedeemParams {
    authorization_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthorizationCode {
    pub authorization_code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RedeemedToken {
    pub access_token: String,
}

fn no_store() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers
}

#[utoipa::path(
    get,
    path = "/issue-authorization-code",
    params(IssueParams),
    responses (
        (status = 200, description = "Single-use code bound to a fresh session token", body = AuthorizationCode),
        (status = 400, description = "Redirect target is not allowed"),
        (status = 401, description = "No valid session"),
    ),
    security(("bearer" = [])),
    tag = "authorization-code"
)]
#[instrument(skip_all)]
pub async fn issue_authorization_code(
    headers: HeaderMap,
    codec: Extension<Arc<TokenCodec>>,
    exchange: Extension<Arc<CodeExchange>>,
    config: Extension<Arc<SessionConfig>>,
    params: Option<Query<IssueParams>>,
) -> Result<impl IntoResponse> {
    let claims = authenticated_claims(&headers, &codec)?;

    let params = params.map(|Query(params)| params).unwrap_or_default();
    if let Some(redirect_uri) = params.redirect_uri.as_deref() {
        if !config.redirect_allowed(redirect_uri) {
            debug!(redirect_uri, "Refused authorization code for redirect");
            return Err(Error::validation("Invalid redirect URI"));
        }
    } else if !config.redirect_hosts().is_empty() {
        return Err(Error::validation("Invalid redirect URI"));
    }

    let authorization_code = exchange.issue(&claims).await?;

    Ok((no_store(), Json(AuthorizationCode { authorization_code })))
}

#[utoipa::path(
    get,
    path = "/redeem-authorization-code",
    params(RedeemParams),
    responses (
        (status = 200, description = "Code consumed", body = RedeemedToken),
        (status = 400, description = "Unknown, expired or already redeemed code"),
    ),
    tag = "authorization-code"
)]
#[instrument(skip_all)]
pub async fn redeem_authorization_code(
    exchange: Extension<Arc<CodeExchange>>,
    params: Option<Query<RedeemParams>>,
) -> Result<impl IntoResponse> {
    let params = params.map(|Query(params)| params).unwrap_or_default();
    let code = params.authorization_code.ok_or(Error::CodeNotFound)?;

    let access_token = exchange.redeem(&code).await?;

    Ok((no_store(), Json(RedeemedToken { access_token })))
}
