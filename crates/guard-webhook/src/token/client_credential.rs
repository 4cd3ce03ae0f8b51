//! OAuth2 client-credential token provider

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::error::{Result, TokenError};
use super::provider::{TokenProvider, TokenResponse, read_token_response};
use crate::constants::CLIENT_CREDENTIAL_PROVIDER_NAME;
use crate::helpers::build_http_client;

/// Exchanges a client id and secret for a token at the tenant's v2 endpoint
pub struct ClientCredentialTokenProvider {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for ClientCredentialTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentialTokenProvider")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl ClientCredentialTokenProvider {
    pub fn new(
        aad_endpoint: &Url,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        if tenant_id.is_empty() {
            return Err(TokenError::Config("tenant id is required".into()));
        }

        let token_url = aad_endpoint
            .join(&format!("{tenant_id}/oauth2/v2.0/token"))
            .map_err(|e| TokenError::Config(format!("Invalid token endpoint: {e}")))?;

        let http = build_http_client(timeout)
            .map_err(|e| TokenError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    #[must_use]
    pub const fn token_url(&self) -> &Url {
        &self.token_url
    }
}

#[async_trait]
impl TokenProvider for ClientCredentialTokenProvider {
    async fn acquire(&self, scope: &str) -> Result<TokenResponse> {
        let endpoint = self.token_url.as_str();
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|source| TokenError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        read_token_response(endpoint, response).await
    }

    fn name(&self) -> &'static str {
        CLIENT_CREDENTIAL_PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn provider(server: &MockServer) -> ClientCredentialTokenProvider {
        let aad = Url::parse(&format!("{}/", server.uri())).unwrap();
        ClientCredentialTokenProvider::new(
            &aad,
            "tenant-1",
            "client-id",
            "client-secret",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_acquire_posts_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-id"))
            .and(body_string_contains("client_secret=client-secret"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fmanagement.azure.com%2F.default",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{ "token_type": "Bearer", "expires_in": 8459, "access_token": "arm-token"}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server)
            .acquire("https://management.azure.com/.default")
            .await
            .unwrap();

        assert_eq!(response.access_token, "arm-token");
        assert_eq!(response.expires_in, 8459);
    }

    #[tokio::test]
    async fn test_acquire_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = provider(&server).acquire("scope").await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("invalid_client"));
    }

    #[test]
    fn test_token_url_and_name() {
        let aad = Url::parse("https://login.microsoftonline.com/").unwrap();
        let provider =
            ClientCredentialTokenProvider::new(&aad, "t", "id", "s3cr3t", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            provider.token_url().as_str(),
            "https://login.microsoftonline.com/t/oauth2/v2.0/token"
        );
        assert_eq!(provider.name(), "ClientCredentialTokenProvider");
        assert!(!format!("{provider:?}").contains("s3cr3t"));
    }

    #[test]
    fn test_requires_tenant() {
        let aad = Url::parse("https://login.microsoftonline.com/").unwrap();
        let result =
            ClientCredentialTokenProvider::new(&aad, "", "id", "secret", Duration::from_secs(1));
        assert!(matches!(result, Err(TokenError::Config(_))));
    }
}
