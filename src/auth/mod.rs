//! GitHub App credential lifecycle.
//!
//! [`CredentialManager`] hands out installation access tokens: it signs an App
//! JWT, exchanges it at the installation access-token endpoint, and caches the
//! result per installation. Concurrent callers for the same installation
//! during a refresh coalesce into one outstanding exchange (single-flight).
//!
//! The manager is an explicit object shared by `Arc`, never process-global
//! state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::github::rest::{ApiError, ApiOutcome, RestClient};
use crate::github::retry::Retryable;
use crate::github::wire::TokenResponse;
use crate::types::InstallationId;

mod jwt;

pub use jwt::JwtSigner;

/// Credential issuance failure. Exchange-level failures are retryable;
/// key-handling failures are not (retrying cannot fix a bad key).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to parse App private key: {0}")]
    Key(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign App JWT: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("token exchange for installation {installation} rejected: {outcome}")]
    Exchange {
        installation: InstallationId,
        outcome: &'static str,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Retryable for AuthError {
    fn is_retryable(&self) -> bool {
        match self {
            AuthError::Key(_) | AuthError::Sign(_) => false,
            AuthError::Exchange { .. } => true,
            AuthError::Api(e) => e.is_retryable(),
        }
    }
}

/// Performs the actual JWT-for-token exchange. A trait so the cache logic is
/// testable without GitHub.
pub trait TokenExchanger: Send + Sync + 'static {
    fn exchange(
        &self,
        installation: InstallationId,
    ) -> impl Future<Output = Result<TokenResponse, AuthError>> + Send;
}

/// Production exchanger: sign a fresh App JWT, POST it to the access-token
/// endpoint.
pub struct RestTokenExchanger {
    signer: JwtSigner,
    rest: RestClient,
}

impl RestTokenExchanger {
    pub fn new(signer: JwtSigner, rest: RestClient) -> Self {
        RestTokenExchanger { signer, rest }
    }
}

impl TokenExchanger for RestTokenExchanger {
    async fn exchange(&self, installation: InstallationId) -> Result<TokenResponse, AuthError> {
        let jwt = self.signer.sign()?;
        match self
            .rest
            .exchange_installation_token(&jwt, installation)
            .await?
        {
            ApiOutcome::Success(response) => Ok(response),
            ApiOutcome::NotFound => Err(AuthError::Exchange {
                installation,
                outcome: "installation not found",
            }),
            ApiOutcome::Unauthorized => Err(AuthError::Exchange {
                installation,
                outcome: "unauthorized",
            }),
            ApiOutcome::RateLimited => Err(AuthError::Exchange {
                installation,
                outcome: "rate limited",
            }),
            ApiOutcome::ServerError => Err(AuthError::Exchange {
                installation,
                outcome: "server error",
            }),
        }
    }
}

/// Margin subtracted from GitHub's reported expiry. The effective expiry is
/// strictly earlier than the real one, so a token handed out here is never
/// already expired by the time it hits the wire.
const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    effective_expiry: DateTime<Utc>,
}

impl CachedToken {
    fn from_response(response: &TokenResponse) -> Self {
        CachedToken {
            token: response.token.clone(),
            effective_expiry: response.expires_at
                - Duration::seconds(EXPIRY_SAFETY_MARGIN_SECS),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.effective_expiry
    }
}

#[derive(Default)]
struct TokenSlot {
    cached: Option<CachedToken>,
}

/// Per-installation token cache with single-flight refresh.
///
/// Each installation gets one async-mutex slot. A caller that finds the slot
/// stale performs the exchange while holding the slot lock; callers arriving
/// meanwhile block on that same lock and, once it frees, find a fresh token
/// instead of issuing a redundant exchange.
pub struct CredentialManager<E> {
    exchanger: E,
    slots: RwLock<HashMap<InstallationId, Arc<Mutex<TokenSlot>>>>,
}

impl<E: TokenExchanger> CredentialManager<E> {
    pub fn new(exchanger: E) -> Self {
        CredentialManager {
            exchanger,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a token usable immediately, refreshing transparently when the
    /// cached one is within the safety margin of its expiry.
    pub async fn installation_token(
        &self,
        installation: InstallationId,
    ) -> Result<String, AuthError> {
        let slot = self.slot(installation).await;
        let mut slot = slot.lock().await;

        if let Some(cached) = &slot.cached {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.token.clone());
            }
            debug!(%installation, "Cached installation token expired, refreshing");
        } else {
            debug!(%installation, "No cached installation token, exchanging");
        }

        let response = self.exchanger.exchange(installation).await?;
        let cached = CachedToken::from_response(&response);
        let token = cached.token.clone();
        slot.cached = Some(cached);
        Ok(token)
    }

    /// Drops the cached token for an installation. Called when GitHub answers
    /// Unauthorized to a request carrying it.
    pub async fn invalidate(&self, installation: InstallationId) {
        let slots = self.slots.read().await;
        if let Some(slot) = slots.get(&installation) {
            slot.lock().await.cached = None;
            debug!(%installation, "Invalidated cached installation token");
        }
    }

    /// Gets or lazily creates the slot for an installation.
    async fn slot(&self, installation: InstallationId) -> Arc<Mutex<TokenSlot>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(&installation) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots
            .entry(installation)
            .or_insert_with(|| Arc::new(Mutex::new(TokenSlot::default())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    /// Counts exchanges; each one yields a distinct token string.
    ///
    /// The call counter lives behind an `Arc` so the handle can be cloned — one
    /// clone moves into the `CredentialManager`, the other stays in the test for
    /// assertions — while both observe the same count. Using an owned, `'static`
    /// exchanger (rather than a `&'static` reference) keeps the manager's type
    /// parameter off of reference types, which async-fn-in-trait impls plus
    /// `tokio::spawn` do not handle (rust-lang/rust#100013).
    #[derive(Clone)]
    struct CountingExchanger {
        calls: Arc<AtomicU32>,
        ttl_secs: i64,
    }

    impl CountingExchanger {
        fn with_ttl(ttl_secs: i64) -> Self {
            CountingExchanger {
                calls: Arc::new(AtomicU32::new(0)),
                ttl_secs,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenExchanger for CountingExchanger {
        async fn exchange(
            &self,
            installation: InstallationId,
        ) -> Result<TokenResponse, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // Hold the exchange open briefly so concurrent callers overlap.
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            Ok(TokenResponse {
                token: format!("ghs_{}_{}", installation, n),
                expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
            })
        }
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_expiry() {
        let exchanger = CountingExchanger::with_ttl(3600);
        let manager = CredentialManager::new(exchanger.clone());
        let id = InstallationId(1);

        let first = manager.installation_token(id).await.unwrap();
        let second = manager.installation_token(id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(exchanger.calls(), 1);
    }

    #[tokio::test]
    async fn token_within_safety_margin_is_refreshed() {
        // Reported TTL of 30s is inside the 60s margin: effectively expired.
        let exchanger = CountingExchanger::with_ttl(30);
        let manager = CredentialManager::new(exchanger.clone());
        let id = InstallationId(1);

        let first = manager.installation_token(id).await.unwrap();
        let second = manager.installation_token(id).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(exchanger.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_into_one_exchange() {
        let exchanger = CountingExchanger::with_ttl(3600);
        let manager = Arc::new(CredentialManager::new(exchanger.clone()));
        let id = InstallationId(7);

        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.installation_token(id).await.unwrap() })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.installation_token(id).await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!(a, b, "both callers must receive the same token");
        assert_eq!(exchanger.calls(), 1, "exactly one exchange must happen");
    }

    #[tokio::test]
    async fn different_installations_do_not_share_tokens() {
        let exchanger = CountingExchanger::with_ttl(3600);
        let manager = CredentialManager::new(exchanger.clone());

        let a = manager.installation_token(InstallationId(1)).await.unwrap();
        let b = manager.installation_token(InstallationId(2)).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(exchanger.calls(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_exchange() {
        let exchanger = CountingExchanger::with_ttl(3600);
        let manager = CredentialManager::new(exchanger.clone());
        let id = InstallationId(1);

        let first = manager.installation_token(id).await.unwrap();
        manager.invalidate(id).await;
        let second = manager.installation_token(id).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(exchanger.calls(), 2);
    }

    #[test]
    fn effective_expiry_is_strictly_before_reported() {
        let reported = Utc::now() + Duration::seconds(600);
        let cached = CachedToken::from_response(&TokenResponse {
            token: "ghs_x".to_string(),
            expires_at: reported,
        });
        assert!(cached.effective_expiry < reported);
    }

    #[test]
    fn auth_error_retryability() {
        let exchange = AuthError::Exchange {
            installation: InstallationId(1),
            outcome: "server error",
        };
        assert!(exchange.is_retryable());

        let key = JwtSigner::from_rsa_pem("id", b"garbage").unwrap_err();
        assert!(!key.is_retryable());
    }
}
