use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    api::{self, handlers::parse_origin, AppState, SessionConfig},
    cli::{commands::keys::KeySource, telemetry},
    exchange::{CodeExchange, MemoryCodeStore, DEFAULT_SWEEP_INTERVAL},
    store::{CredentialStore, MemoryCredentialStore, PgCredentialStore},
    token::{Algorithm, KeyPair, TokenCodec},
};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    /// `None` selects the in-memory credential store.
    pub dsn: Option<SecretString>,
    pub private_key: Option<KeySource>,
    pub public_key: Option<KeySource>,
    pub algorithm: Algorithm,
    pub token_ttl: Duration,
    pub code_ttl: Duration,
    pub cors_origins: Vec<String>,
    pub cookie_domain: Option<String>,
    pub production: bool,
    pub redirect_hosts: Vec<String>,
}

/// Load the configured keys and run the integrity check.
///
/// # Errors
/// Returns an error if a key cannot be read or parsed, or if the private and
/// public keys do not belong together.
pub fn load_keys(args: &Args) -> Result<KeyPair> {
    let private_key = args.private_key.as_ref().map(KeySource::read).transpose()?;
    let public_key = args.public_key.as_ref().map(KeySource::read).transpose()?;

    let keys = KeyPair::from_pem_or_der(
        private_key.as_deref(),
        public_key.as_deref(),
        args.algorithm,
    )
    .context("key integrity check failed")?;

    if keys.can_sign() {
        info!(algorithm = %keys.algorithm(), "Key pair verified");
    } else {
        warn!(
            algorithm = %keys.algorithm(),
            "No private key configured, running verify-only"
        );
    }

    Ok(keys)
}

async fn connect_store(dsn: Option<&SecretString>) -> Result<Arc<dyn CredentialStore>> {
    match dsn {
        Some(dsn) => {
            let store = PgCredentialStore::connect(dsn.expose_secret()).await?;
            info!("Connected to credential store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("Using in-memory credential store, users are lost on restart");
            Ok(Arc::new(MemoryCredentialStore::new()))
        }
    }
}

fn session_config(args: &Args) -> Result<SessionConfig> {
    let cors_origins = args
        .cors_origins
        .iter()
        .map(|origin| parse_origin(origin))
        .collect::<Result<Vec<_>>>()?;

    Ok(SessionConfig::new(args.token_ttl.as_secs())
        .with_cookie_domain(args.cookie_domain.clone())
        .with_cookie_secure(args.production)
        .with_redirect_hosts(args.redirect_hosts.clone())
        .with_cors_origins(cors_origins))
}

/// Assemble the shared state. Keys are checked before anything else so a bad
/// pair never reaches the store or the listener.
///
/// # Errors
/// Returns an error if the keys, the session settings or the store are invalid.
pub async fn build_state(args: &Args) -> Result<AppState> {
    let keys = load_keys(args)?;
    let session = session_config(args)?;

    let codec = Arc::new(TokenCodec::new(keys, args.token_ttl));
    let exchange = Arc::new(CodeExchange::new(
        codec.clone(),
        Arc::new(MemoryCodeStore::new()),
        args.code_ttl,
    ));
    let store = connect_store(args.dsn.as_ref()).await?;

    Ok(AppState {
        codec,
        exchange,
        store,
        session: Arc::new(session),
    })
}

/// Execute the server action
/// # Errors
/// Returns an error if startup fails or the server stops with an error.
pub async fn execute(args: Args) -> Result<()> {
    let state = build_state(&args).await?;

    let sweeper = state
        .exchange
        .spawn_sweeper(DEFAULT_SWEEP_INTERVAL.min(args.code_ttl));

    let result = api::new(args.port, state).await;

    sweeper.abort();
    telemetry::shutdown_tracer();

    result
}
