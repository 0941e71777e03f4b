//! Compact JWS encoding: `base64url(header).base64url(payload).base64url(signature)`.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::keys::Algorithm;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub alg: String,
    pub typ: String,
}

impl Header {
    fn new(algorithm: Algorithm) -> Self {
        Self {
            alg: algorithm.as_str().to_string(),
            typ: "JWT".to_string(),
        }
    }
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|err| Error::Config(format!("failed to encode token part: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| Error::Malformed)
}

pub(crate) fn sign<T: Serialize>(
    algorithm: Algorithm,
    private_key: &RsaPrivateKey,
    payload: &T,
) -> Result<String> {
    let header_b64 = b64e_json(&Header::new(algorithm))?;
    let payload_b64 = b64e_json(payload)?;
    let signing_input = format!("{header_b64}.{payload_b64}");

    let signature = algorithm.sign(private_key, signing_input.as_bytes())?;
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Check structure, algorithm and signature, then decode the payload.
///
/// The header must name the configured algorithm; anything else is rejected
/// as an invalid signature so a token cannot pick its own verification rules.
pub(crate) fn verify<T: DeserializeOwned>(
    algorithm: Algorithm,
    public_key: &RsaPublicKey,
    token: &str,
) -> Result<T> {
    let mut parts = token.trim().split('.');
    let header_b64 = parts.next().ok_or(Error::Malformed)?;
    let payload_b64 = parts.next().ok_or(Error::Malformed)?;
    let signature_b64 = parts.next().ok_or(Error::Malformed)?;
    if parts.next().is_some() || header_b64.is_empty() || payload_b64.is_empty() {
        return Err(Error::Malformed);
    }

    let header: Header = b64d_json(header_b64)?;
    if header.alg != algorithm.as_str() {
        return Err(Error::InvalidSignature);
    }

    let signature = Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| Error::Malformed)?;
    let signing_input = format!("{header_b64}.{payload_b64}");
    algorithm.verify(public_key, signing_input.as_bytes(), &signature)?;

    b64d_json(payload_b64)
}
