//! Azure AD bearer token authenticator

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::config::AzureAuthConfig;
use super::error::Result as AuthResult;
use super::jwks::{JwksCache, JwksRefreshTask};
use super::jwt::JwtValidator;
use super::oidc::discover_jwks_uri;
use crate::Result;
use crate::constants::ORG_AZURE;
use crate::registry::Authenticator;
use crate::types::Identity;

/// Validates Azure AD tokens and maps their claims to an [`Identity`]
#[derive(Debug)]
pub struct AzureAuthenticator {
    validator: JwtValidator,
}

impl AzureAuthenticator {
    #[must_use]
    pub const fn new(validator: JwtValidator) -> Self {
        Self { validator }
    }

    /// Discover the tenant's signing keys, fetch them once, and keep them
    /// fresh in the background until `shutdown` fires
    pub async fn discover(config: &AzureAuthConfig, shutdown: CancellationToken) -> AuthResult<Self> {
        config.validate()?;
        let jwks_uri = discover_jwks_uri(&config.discovery_issuer()?, config.timeout).await?;
        Self::with_jwks_uri(config, jwks_uri, shutdown).await
    }

    /// Build against a known JWKS URI without discovery
    pub async fn with_jwks_uri(
        config: &AzureAuthConfig,
        jwks_uri: Url,
        shutdown: CancellationToken,
    ) -> AuthResult<Self> {
        config.validate()?;
        tracing::info!(
            tenant = %config.tenant_id,
            jwks_uri = %jwks_uri,
            verify_audience = config.verify_clientid_in_audience,
            "Creating Azure authenticator"
        );

        let cache = Arc::new(JwksCache::new(
            jwks_uri,
            config.jwks_cache_ttl,
            config.timeout,
        )?);
        cache.refresh().await?;

        JwksRefreshTask::new(Arc::clone(&cache), config.jwks_refresh_interval).spawn(shutdown);

        Ok(Self::new(JwtValidator::new(config.jwt_config()?, cache)))
    }
}

#[async_trait]
impl Authenticator for AzureAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity> {
        let claims = self.validator.validate(token).await.inspect_err(|e| {
            tracing::debug!(error = %e, "Azure token rejected");
        })?;
        Ok(claims.into_identity()?)
    }

    fn name(&self) -> &'static str {
        ORG_AZURE
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::jwt::test_support::{TestSigner, now};

    const OID: &str = "7d5c5a0f-1d0c-4a44-9d6f-2f5d0c1b3e11";

    async fn mock_tenant(server: &MockServer, signer: &TestSigner) {
        let issuer = format!("{}/tenant/v2.0", server.uri());
        Mock::given(method("GET"))
            .and(path("/tenant/v2.0/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/oauth2/v2.0/authorize"),
                "jwks_uri": format!("{}/tenant/discovery/v2.0/keys", server.uri()),
                "response_types_supported": ["code"],
                "subject_types_supported": ["pairwise"],
                "id_token_signing_alg_values_supported": ["ES256"]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tenant/discovery/v2.0/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(signer.jwks()))
            .mount(server)
            .await;
    }

    fn config(server: &MockServer) -> AzureAuthConfig {
        AzureAuthConfig::new("tenant", "client-id")
            .unwrap()
            .with_aad_endpoint(Url::parse(&format!("{}/", server.uri())).unwrap())
    }

    #[tokio::test]
    async fn test_authenticate_v2_token() {
        let server = MockServer::start().await;
        let signer = TestSigner::new("k1");
        mock_tenant(&server, &signer).await;

        let shutdown = CancellationToken::new();
        let authenticator = AzureAuthenticator::discover(&config(&server), shutdown.clone())
            .await
            .unwrap();

        let token = signer.sign(&serde_json::json!({
            "iss": format!("{}/tenant/v2.0", server.uri()),
            "aud": "client-id",
            "exp": now() + 3600,
            "oid": OID,
            "preferred_username": "nahid@example.com",
            "groups": ["1cffe3ae-93c0-4a87-9484-2e90e682aae9"]
        }));

        let identity = authenticator.authenticate(&token).await.unwrap();
        assert_eq!(identity.username, "nahid@example.com");
        assert_eq!(identity.extra["oid"], vec![OID.to_string()]);
        assert_eq!(identity.groups.len(), 1);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_authenticate_v1_issuer_accepted() {
        let server = MockServer::start().await;
        let signer = TestSigner::new("k1");
        mock_tenant(&server, &signer).await;

        let shutdown = CancellationToken::new();
        let authenticator = AzureAuthenticator::discover(&config(&server), shutdown.clone())
            .await
            .unwrap();

        let token = signer.sign(&serde_json::json!({
            "iss": "https://sts.windows.net/tenant/",
            "exp": now() + 3600,
            "oid": OID,
            "upn": "nahid@example.com"
        }));

        assert!(authenticator.authenticate(&token).await.is_ok());
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_authenticate_requires_oid() {
        let server = MockServer::start().await;
        let signer = TestSigner::new("k1");
        mock_tenant(&server, &signer).await;

        let shutdown = CancellationToken::new();
        let authenticator = AzureAuthenticator::with_jwks_uri(
            &config(&server),
            Url::parse(&format!("{}/tenant/discovery/v2.0/keys", server.uri())).unwrap(),
            shutdown.clone(),
        )
        .await
        .unwrap();

        let token = signer.sign(&serde_json::json!({
            "iss": "https://sts.windows.net/tenant/",
            "exp": now() + 3600,
            "upn": "nahid@example.com"
        }));

        let err = authenticator.authenticate(&token).await.unwrap_err();
        assert_eq!(err.to_string(), "Authentication failed: claim oid is missing");
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_authenticate_rejects_audience_mismatch() {
        let server = MockServer::start().await;
        let signer = TestSigner::new("k1");
        mock_tenant(&server, &signer).await;

        let shutdown = CancellationToken::new();
        let config = config(&server).with_verify_clientid_in_audience(true);
        let authenticator = AzureAuthenticator::discover(&config, shutdown.clone())
            .await
            .unwrap();

        let token = signer.sign(&serde_json::json!({
            "iss": "https://sts.windows.net/tenant/",
            "aud": "someone-else",
            "exp": now() + 3600,
            "oid": OID,
            "upn": "nahid@example.com"
        }));

        assert!(authenticator.authenticate(&token).await.is_err());
        shutdown.cancel();
    }
}
