use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identity carried inside a session token.
///
/// Contents are signed, not encrypted: anyone holding the token can read them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(rename = "sub", alias = "username")]
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Issued-at, unix seconds. Set when minting.
    #[serde(default)]
    pub iat: i64,
    /// Expiry, unix seconds. Set when minting.
    #[serde(default)]
    pub exp: i64,
    /// Optional fields not known to this version of the service.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    #[must_use]
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            roles: None,
            iat: 0,
            exp: 0,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = if roles.is_empty() { None } else { Some(roles) };
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Same identity, timestamps cleared. Used when re-minting.
    #[must_use]
    pub fn identity(&self) -> Self {
        Self {
            iat: 0,
            exp: 0,
            ..self.clone()
        }
    }
}
