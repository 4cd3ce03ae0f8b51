//! Bearer token lifecycle for the remote policy API

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::error::Result;
use super::provider::TokenProvider;
use crate::constants::TOKEN_EXPIRY_SKEW;
use crate::observability;

/// Cached bearer token with a skew-adjusted expiry
#[derive(Clone)]
pub struct TokenCredential {
    token: String,
    expires_at: Instant,
}

impl std::fmt::Debug for TokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl TokenCredential {
    /// Credential valid for `lifetime` minus the expiry skew
    #[must_use]
    pub fn new(token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            token: token.into(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_SKEW),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Owns the current token and refreshes it through a [`TokenProvider`].
///
/// Concurrent callers that find the token expired queue on a single refresh
/// lock; the first performs the refresh and the rest reuse its result.
pub struct TokenCredentialManager {
    provider: Arc<dyn TokenProvider>,
    scope: String,
    current: RwLock<Option<TokenCredential>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for TokenCredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredentialManager")
            .field("provider", &self.provider.name())
            .field("scope", &self.scope)
            .field("current", &*self.current.read())
            .finish_non_exhaustive()
    }
}

impl TokenCredentialManager {
    pub fn new(provider: Arc<dyn TokenProvider>, scope: impl Into<String>) -> Self {
        Self {
            provider,
            scope: scope.into(),
            current: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// True when no token is held or the held token is past its skew-adjusted expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .is_none_or(TokenCredential::is_expired)
    }

    /// Acquire a new token unconditionally.
    ///
    /// On failure the previously held token is left untouched.
    pub async fn refresh(&self) -> Result<TokenCredential> {
        let name = self.provider.name();

        match self.provider.acquire(&self.scope).await {
            Ok(response) => {
                let credential = TokenCredential::new(
                    response.access_token,
                    Duration::from_secs(response.expires_in),
                );
                *self.current.write() = Some(credential.clone());

                observability::record_token_refresh(name, true);
                tracing::info!(
                    provider = name,
                    expires_in_secs = response.expires_in,
                    "Refreshed policy API token"
                );
                Ok(credential)
            }
            Err(e) => {
                observability::record_token_refresh(name, false);
                tracing::error!(provider = name, error = %e, "Failed to refresh policy API token");
                Err(e)
            }
        }
    }

    /// Return a usable bearer token, refreshing at most once across concurrent callers
    pub async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        // A token shorter-lived than the skew is used once rather than refetched in a loop
        Ok(self.refresh().await?.token)
    }

    fn fresh_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|credential| !credential.is_expired())
            .map(|credential| credential.token.clone())
    }
}
