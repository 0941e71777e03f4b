use axum::{extract::Extension, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::{error::Result, token::TokenCodec};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PublicKey {
    /// SPKI PEM.
    pub public_key: String,
    pub algorithm: String,
}

#[utoipa::path(
    get,
    path = "/public-key",
    responses (
        (status = 200, description = "Key for verifying session tokens offline", body = PublicKey),
    ),
    tag = "keys"
)]
pub async fn public_key(codec: Extension<Arc<TokenCodec>>) -> Result<impl IntoResponse> {
    Ok(Json(PublicKey {
        public_key: codec.public_key_pem()?,
        algorithm: codec.algorithm().to_string(),
    }))
}
