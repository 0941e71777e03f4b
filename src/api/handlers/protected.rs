use axum::{extract::Extension, http::HeaderMap, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::session::authenticated_claims;
use crate::{error::Result, token::TokenCodec};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Greeting {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/protected",
    responses (
        (status = 200, description = "Caller is signed in", body = Greeting),
        (status = 401, description = "No valid session"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn protected(
    headers: HeaderMap,
    codec: Extension<Arc<TokenCodec>>,
) -> Result<impl IntoResponse> {
    let claims = authenticated_claims(&headers, &codec)?;
    Ok(Json(Greeting {
        message: format!("Hello {}, this is a protected resource.", claims.username),
    }))
}
