//! Key material, signing algorithms and the startup key integrity check.

use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
    Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::{fmt, str::FromStr};
use tracing::{debug, error};

use super::jws;
use crate::error::{Error, Result};

/// RSASSA-PKCS1-v1_5 signature algorithms accepted for session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Rs256,
    Rs384,
    Rs512,
}

impl Algorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
        }
    }

    fn prehash(self, message: &[u8]) -> (Pkcs1v15Sign, Vec<u8>) {
        match self {
            Self::Rs256 => (
                Pkcs1v15Sign::new::<Sha256>(),
                Sha256::digest(message).to_vec(),
            ),
            Self::Rs384 => (
                Pkcs1v15Sign::new::<Sha384>(),
                Sha384::digest(message).to_vec(),
            ),
            Self::Rs512 => (
                Pkcs1v15Sign::new::<Sha512>(),
                Sha512::digest(message).to_vec(),
            ),
        }
    }

    pub(crate) fn sign(self, key: &RsaPrivateKey, message: &[u8]) -> Result<Vec<u8>> {
        let (scheme, hashed) = self.prehash(message);
        key.sign(scheme, &hashed).map_err(|err| {
            error!("Failed to sign token: {}", err);
            Error::Config(format!("signing with {self} failed"))
        })
    }

    pub(crate) fn verify(self, key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
        let (scheme, hashed) = self.prehash(message);
        key.verify(scheme, &hashed, signature)
            .map_err(|_| Error::InvalidSignature)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RS256" => Ok(Self::Rs256),
            "RS384" => Ok(Self::Rs384),
            "RS512" => Ok(Self::Rs512),
            other => Err(Error::Config(format!("unsupported algorithm: {other}"))),
        }
    }
}

/// Process-wide signing material. Loaded once at startup and shared read-only.
///
/// Without a private key the pair can only verify; minting reports a
/// configuration error.
#[derive(Clone)]
pub struct KeyPair {
    algorithm: Algorithm,
    private_key: Option<RsaPrivateKey>,
    public_key: RsaPublicKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm)
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Build a key pair from PEM or DER encoded keys.
    ///
    /// A missing public key is derived from the private key. When both are
    /// given they must belong together, see [`check_key_pair`].
    ///
    /// # Errors
    /// Returns [`Error::Config`] when no key is given or a key cannot be parsed,
    /// and [`Error::KeyMismatch`] when the keys do not belong together.
    pub fn from_pem_or_der(
        private_key: Option<&[u8]>,
        public_key: Option<&[u8]>,
        algorithm: Algorithm,
    ) -> Result<Self> {
        let private_key = private_key.map(decode_private_key).transpose()?;
        let public_key = public_key.map(decode_public_key).transpose()?;

        match (private_key, public_key) {
            (Some(private_key), Some(public_key)) => {
                check_key_pair(&private_key, &public_key, algorithm)?;
                Ok(Self {
                    algorithm,
                    private_key: Some(private_key),
                    public_key,
                })
            }
            (Some(private_key), None) => {
                debug!("Deriving public key from private key");
                let public_key = RsaPublicKey::from(&private_key);
                check_key_pair(&private_key, &public_key, algorithm)?;
                Ok(Self {
                    algorithm,
                    private_key: Some(private_key),
                    public_key,
                })
            }
            (None, Some(public_key)) => Ok(Self {
                algorithm,
                private_key: None,
                public_key,
            }),
            (None, None) => Err(Error::Config(
                "a private or public key is required".to_string(),
            )),
        }
    }

    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub const fn can_sign(&self) -> bool {
        self.private_key.is_some()
    }

    pub(crate) fn private_key(&self) -> Result<&RsaPrivateKey> {
        self.private_key
            .as_ref()
            .ok_or_else(|| Error::Config("no private key loaded".to_string()))
    }

    pub(crate) const fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// SPKI PEM encoding of the public key, suitable for publishing.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the key cannot be encoded.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| Error::Config(format!("failed to encode public key: {err}")))
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
struct Probe {
    probe: String,
}

const PROBE_PAYLOAD: &str = "sesame-key-integrity-probe";

/// Sign a fixed probe with the private key and verify it with the public key.
///
/// Runs once before the listener is bound; a failure must abort startup.
///
/// # Errors
/// Returns [`Error::KeyMismatch`] when the public key does not verify what the
/// private key signed.
pub fn check_key_pair(
    private_key: &RsaPrivateKey,
    public_key: &RsaPublicKey,
    algorithm: Algorithm,
) -> Result<()> {
    let probe = Probe {
        probe: PROBE_PAYLOAD.to_string(),
    };
    let token = jws::sign(algorithm, private_key, &probe)?;

    match jws::verify::<Probe>(algorithm, public_key, &token) {
        Ok(decoded) if decoded == probe => Ok(()),
        Ok(_) => {
            error!("Key integrity probe decoded to a different payload");
            Err(Error::KeyMismatch)
        }
        Err(err) => {
            error!("Key integrity probe failed: {}", err);
            Err(Error::KeyMismatch)
        }
    }
}

fn decode_private_key(pem_or_der: &[u8]) -> Result<RsaPrivateKey> {
    let parse_error = || Error::Config("failed to parse RSA private key".to_string());

    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| parse_error())?;
        return RsaPrivateKey::from_pkcs8_pem(s)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(s))
            .map_err(|_| parse_error());
    }

    RsaPrivateKey::from_pkcs8_der(pem_or_der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(pem_or_der))
        .map_err(|_| parse_error())
}

fn decode_public_key(pem_or_der: &[u8]) -> Result<RsaPublicKey> {
    let parse_error = || Error::Config("failed to parse RSA public key".to_string());

    if pem_or_der.starts_with(b"-----BEGIN") {
        let s = std::str::from_utf8(pem_or_der).map_err(|_| parse_error())?;
        return RsaPublicKey::from_public_key_pem(s)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(s))
            .map_err(|_| parse_error());
    }

    RsaPublicKey::from_public_key_der(pem_or_der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(pem_or_der))
        .map_err(|_| parse_error())
}
