//! Session cookie and redirect settings shared by the handlers.

use axum::http::HeaderValue;
use url::Url;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    cookie_domain: Option<String>,
    cookie_secure: bool,
    cookie_max_age_seconds: u64,
    redirect_hosts: Vec<String>,
    cors_origins: Vec<HeaderValue>,
}

impl SessionConfig {
    #[must_use]
    pub fn new(cookie_max_age_seconds: u64) -> Self {
        Self {
            cookie_max_age_seconds,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain.filter(|domain| !domain.trim().is_empty());
        self
    }

    /// Only mark cookies `Secure` when the service is reached over HTTPS.
    #[must_use]
    pub const fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_redirect_hosts(mut self, hosts: Vec<String>) -> Self {
        self.redirect_hosts = hosts
            .into_iter()
            .map(|host| host.trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_cors_origins(mut self, origins: Vec<HeaderValue>) -> Self {
        self.cors_origins = origins;
        self
    }

    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    #[must_use]
    pub const fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub const fn cookie_max_age_seconds(&self) -> u64 {
        self.cookie_max_age_seconds
    }

    #[must_use]
    pub fn redirect_hosts(&self) -> &[String] {
        &self.redirect_hosts
    }

    #[must_use]
    pub fn cors_origins(&self) -> &[HeaderValue] {
        &self.cors_origins
    }

    /// An empty allowlist accepts any target.
    ///
    /// `redirect_uri` may be a bare host (`app.example.com`, optionally with a
    /// port) or an absolute URL; the host part must equal a configured entry.
    #[must_use]
    pub fn redirect_allowed(&self, redirect_uri: &str) -> bool {
        if self.redirect_hosts.is_empty() {
            return true;
        }

        let Some((host, authority)) = redirect_target(redirect_uri) else {
            return false;
        };

        self.redirect_hosts
            .iter()
            .any(|allowed| *allowed == host || *allowed == authority)
    }
}

/// Returns `(host, host[:port])`, lowercased.
fn redirect_target(redirect_uri: &str) -> Option<(String, String)> {
    let trimmed = redirect_uri.trim();
    if trimmed.is_empty() {
        return None;
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed).ok()?
    } else {
        Url::parse(&format!("https://{trimmed}")).ok()?
    };

    let host = url.host_str()?.to_ascii_lowercase();
    let authority = url
        .port()
        .map_or_else(|| host.clone(), |port| format!("{host}:{port}"));
    Some((host, authority))
}

/// Parse a configured CORS origin into the exact header value browsers send.
///
/// # Errors
/// Returns an error when the origin has no host or is not a valid URL.
pub fn parse_origin(origin: &str) -> anyhow::Result<HeaderValue> {
    use anyhow::Context;

    let parsed =
        Url::parse(origin.trim()).with_context(|| format!("Invalid CORS origin: {origin}"))?;
    let host = parsed
        .host_str()
        .with_context(|| format!("CORS origin must include a host: {origin}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    HeaderValue::from_str(&format!("{}://{}{}", parsed.scheme(), host, port))
        .context("Failed to build CORS origin header")
}
