use axum::{extract::Extension, http::HeaderMap, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::instrument;

use super::session::authenticated_claims;
use crate::{error::Result, token::TokenCodec};

#[utoipa::path(
    post,
    path = "/verify-token",
    responses (
        (status = 200, description = "Token is valid; body is the decoded claims"),
        (status = 401, description = "Missing, malformed, forged or expired token"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_token(
    headers: HeaderMap,
    codec: Extension<Arc<TokenCodec>>,
) -> Result<impl IntoResponse> {
    let claims = authenticated_claims(&headers, &codec)?;
    Ok(Json(claims))
}
