//! One-time authorization codes for handing a session across a redirect.
//!
//! Each code moves `ISSUED -> REDEEMED` or `ISSUED -> EXPIRED` and never back.
//! The code maps to a freshly minted token; whoever redeems it first gets the
//! token and every later attempt sees [`Error::CodeNotFound`].

mod store;

pub use store::{CodeEntry, CodeStore, MemoryCodeStore};

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, error, warn};

use crate::{
    error::{Error, Result},
    token::{Claims, TokenCodec},
};

pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

const CODE_BYTES: usize = 32;
const MAX_INSERT_ATTEMPTS: usize = 3;

/// Random URL-safe code carrying 256 bits of entropy.
fn generate_code() -> Result<String> {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|err| {
        error!("Failed to generate authorization code: {}", err);
        Error::Config("random source unavailable".to_string())
    })?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub struct CodeExchange {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CodeStore>,
    code_ttl: Duration,
}

impl std::fmt::Debug for CodeExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeExchange")
            .field("code_ttl", &self.code_ttl)
            .finish_non_exhaustive()
    }
}

impl CodeExchange {
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn CodeStore>, code_ttl: Duration) -> Self {
        Self {
            codec,
            store,
            code_ttl,
        }
    }

    #[must_use]
    pub const fn code_ttl(&self) -> Duration {
        self.code_ttl
    }

    /// Bind a new code to a token re-minted from already verified claims.
    ///
    /// # Errors
    /// [`Error::Unauthorized`] for claims without a subject, plus any minting
    /// or store failure.
    pub async fn issue(&self, claims: &Claims) -> Result<String> {
        if claims.username.trim().is_empty() {
            return Err(Error::unauthorized("Could not validate credentials"));
        }

        let token = self.codec.mint_session(&claims.identity())?;

        for _ in 0..MAX_INSERT_ATTEMPTS {
            let code = generate_code()?;
            let entry = CodeEntry {
                code: code.clone(),
                token: token.clone(),
                created_at: Instant::now(),
            };
            if self.store.insert(entry).await? {
                debug!(sub = %claims.username, "Issued authorization code");
                return Ok(code);
            }
            warn!("Authorization code collision, retrying");
        }

        Err(Error::Config(
            "could not allocate a unique authorization code".to_string(),
        ))
    }

    /// Exchange a code for its token, exactly once.
    ///
    /// # Errors
    /// [`Error::CodeNotFound`] when the code is unknown, already redeemed or
    /// expired.
    pub async fn redeem(&self, code: &str) -> Result<String> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::CodeNotFound);
        }

        match self.store.take(code).await? {
            Some(entry) if entry.is_expired(self.code_ttl) => {
                debug!("Authorization code expired before redemption");
                Err(Error::CodeNotFound)
            }
            Some(entry) => Ok(entry.token),
            None => Err(Error::CodeNotFound),
        }
    }

    /// Periodically drop codes nobody redeemed.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let exchange = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match exchange.store.purge_expired(exchange.code_ttl).await {
                    Ok(0) => {}
                    Ok(removed) => debug!("Purged {} expired authorization codes", removed),
                    Err(err) => error!("Failed to purge authorization codes: {}", err),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{test_keys::SIGNING_PRIVATE, Algorithm, KeyPair};
    use async_trait::async_trait;

    fn codec() -> Result<Arc<TokenCodec>> {
        let keys =
            KeyPair::from_pem_or_der(Some(SIGNING_PRIVATE.as_bytes()), None, Algorithm::Rs256)?;
        Ok(Arc::new(TokenCodec::new(keys, Duration::from_secs(1800))))
    }

    fn exchange(store: Arc<dyn CodeStore>) -> Result<CodeExchange> {
        Ok(CodeExchange::new(codec()?, store, DEFAULT_CODE_TTL))
    }

    fn alice() -> Claims {
        Claims::new("alice", "alice@example.com")
    }

    #[test]
    fn codes_are_random_and_url_safe() -> Result<()> {
        let first = generate_code()?;
        let second = generate_code()?;
        assert_ne!(first, second);
        assert_eq!(
            Base64UrlUnpadded::decode_vec(&first).map(|bytes| bytes.len()).ok(),
            Some(CODE_BYTES)
        );
        Ok(())
    }

    #[tokio::test]
    async fn redeem_succeeds_once() -> Result<()> {
        let codec = codec()?;
        let exchange = CodeExchange::new(
            Arc::clone(&codec),
            Arc::new(MemoryCodeStore::new()),
            DEFAULT_CODE_TTL,
        );

        let code = exchange.issue(&alice()).await?;
        let token = exchange.redeem(&code).await?;
        assert_eq!(codec.verify(&token)?.username, "alice");

        assert!(matches!(
            exchange.redeem(&code).await,
            Err(Error::CodeNotFound)
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redeem_has_one_winner() -> Result<()> {
        let exchange = Arc::new(exchange(Arc::new(MemoryCodeStore::new()))?);

        for _ in 0..20 {
            let code = exchange.issue(&alice()).await?;
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let exchange = Arc::clone(&exchange);
                    let code = code.clone();
                    tokio::spawn(async move { exchange.redeem(&code).await })
                })
                .collect();

            let mut winners = 0;
            let mut losers = 0;
            for handle in handles {
                match handle.await {
                    Ok(Ok(_)) => winners += 1,
                    Ok(Err(Error::CodeNotFound)) => losers += 1,
                    other => panic!("unexpected redeem outcome: {other:?}"),
                }
            }
            assert_eq!((winners, losers), (1, 1));
        }
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_blank_codes_are_rejected() -> Result<()> {
        let exchange = exchange(Arc::new(MemoryCodeStore::new()))?;
        assert!(matches!(
            exchange.redeem("nope").await,
            Err(Error::CodeNotFound)
        ));
        assert!(matches!(
            exchange.redeem("  ").await,
            Err(Error::CodeNotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn issue_requires_subject() -> Result<()> {
        let exchange = exchange(Arc::new(MemoryCodeStore::new()))?;
        let result = exchange.issue(&Claims::new("", "x@example.com")).await;
        assert!(matches!(result, Err(Error::Unauthorized(_))));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn expired_code_is_refused() -> Result<()> {
        let store = Arc::new(MemoryCodeStore::new());
        let exchange = exchange(store.clone())?;

        let code = exchange.issue(&alice()).await?;
        tokio::time::advance(DEFAULT_CODE_TTL).await;

        assert!(matches!(
            exchange.redeem(&code).await,
            Err(Error::CodeNotFound)
        ));
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_purges_unredeemed_codes() -> Result<()> {
        let store = Arc::new(MemoryCodeStore::new());
        let exchange = Arc::new(exchange(store.clone())?);

        exchange.issue(&alice()).await?;
        let sweeper = exchange.spawn_sweeper(Duration::from_secs(10));

        tokio::time::sleep(DEFAULT_CODE_TTL + Duration::from_secs(15)).await;
        assert!(store.is_empty().await);

        sweeper.abort();
        Ok(())
    }

    #[tokio::test]
    async fn reissued_token_is_fresh() -> Result<()> {
        let codec = codec()?;
        let exchange = CodeExchange::new(
            Arc::clone(&codec),
            Arc::new(MemoryCodeStore::new()),
            DEFAULT_CODE_TTL,
        );
        let mut presented = alice();
        presented.exp = 1;

        let code = exchange.issue(&presented).await?;
        let token = exchange.redeem(&code).await?;
        let claims = codec.verify(&token)?;
        assert!(claims.exp > 1);
        Ok(())
    }

    struct UnavailableStore;

    #[async_trait]
    impl CodeStore for UnavailableStore {
        async fn insert(&self, _entry: CodeEntry) -> Result<bool> {
            Err(Error::StoreUnavailable(anyhow::anyhow!("cache down")))
        }

        async fn take(&self, _code: &str) -> Result<Option<CodeEntry>> {
            Err(Error::StoreUnavailable(anyhow::anyhow!("cache down")))
        }

        async fn purge_expired(&self, _ttl: Duration) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn store_failures_surface_to_caller() -> Result<()> {
        let exchange = exchange(Arc::new(UnavailableStore))?;
        assert!(matches!(
            exchange.issue(&alice()).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            exchange.redeem("abc").await,
            Err(Error::StoreUnavailable(_))
        ));
        Ok(())
    }

    struct CollidingStore;

    #[async_trait]
    impl CodeStore for CollidingStore {
        async fn insert(&self, _entry: CodeEntry) -> Result<bool> {
            Ok(false)
        }

        async fn take(&self, _code: &str) -> Result<Option<CodeEntry>> {
            Ok(None)
        }

        async fn purge_expired(&self, _ttl: Duration) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn gives_up_after_repeated_collisions() -> Result<()> {
        let exchange = exchange(Arc::new(CollidingStore))?;
        assert!(matches!(
            exchange.issue(&alice()).await,
            Err(Error::Config(_))
        ));
        Ok(())
    }
}
