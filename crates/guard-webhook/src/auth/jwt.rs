//! JWT parsing and validation

use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation, decode_header};

use super::claims::AzureClaims;
use super::config::JwtConfig;
use super::error::{AuthError, Result};
use super::jwks::JwksCache;

/// Validates signatures against a [`JwksCache`] and checks issuer, audience and expiry
pub struct JwtValidator {
    config: JwtConfig,
    jwks_cache: Arc<JwksCache>,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuers", &self.config.issuers)
            .field("audience", &self.config.audience)
            .field("jwks_uri", &self.jwks_cache.jwks_uri().as_str())
            .finish()
    }
}

impl JwtValidator {
    #[must_use]
    pub const fn new(config: JwtConfig, jwks_cache: Arc<JwksCache>) -> Self {
        Self { config, jwks_cache }
    }

    #[must_use]
    pub const fn jwks_cache(&self) -> &Arc<JwksCache> {
        &self.jwks_cache
    }

    pub async fn validate(&self, token: &str) -> Result<AzureClaims> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;

        // Symmetric algorithms would let anyone holding a published key forge tokens
        if !matches!(
            header.alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::ES256
                | Algorithm::ES384
        ) {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let key = self
            .jwks_cache
            .get_key(header.kid.as_deref(), header.alg)
            .await?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&self.config.issuers);

        if self.config.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.config.audience);
        }

        validation.leeway = self.config.clock_skew.as_secs();

        let token_data = jsonwebtoken::decode::<AzureClaims>(token, &key, &validation)?;

        Ok(token_data.claims)
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use url::Url;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::test_support::{TestSigner, now};
    use super::*;

    const ISSUER: &str = "https://sts.windows.net/tenant/";

    async fn setup(signer: &TestSigner, audience: Vec<String>) -> (JwtValidator, MockServer) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(signer.jwks()))
            .mount(&server)
            .await;

        let cache = JwksCache::new(
            Url::parse(&format!("{}/keys", server.uri())).unwrap(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        )
        .unwrap();
        let config = JwtConfig::new(vec![ISSUER.to_string()]).with_audience(audience);

        (JwtValidator::new(config, Arc::new(cache)), server)
    }

    fn claims(iss: &str, exp: i64) -> serde_json::Value {
        serde_json::json!({
            "iss": iss,
            "aud": "client-id",
            "exp": exp,
            "oid": "7d5c5a0f-1d0c-4a44-9d6f-2f5d0c1b3e11",
            "upn": "nahid@example.com",
            "groups": ["g1"]
        })
    }

    #[tokio::test]
    async fn test_validate_valid_token() {
        let signer = TestSigner::new("k1");
        let (validator, _server) = setup(&signer, vec![]).await;

        let token = signer.sign(&claims(ISSUER, now() + 3600));
        let validated = validator.validate(&token).await.unwrap();

        assert_eq!(validated.upn.as_deref(), Some("nahid@example.com"));
        assert_eq!(validated.groups, vec!["g1"]);
    }

    #[tokio::test]
    async fn test_validate_expired_token() {
        let signer = TestSigner::new("k1");
        let (validator, _server) = setup(&signer, vec![]).await;

        let token = signer.sign(&claims(ISSUER, now() - 3600));
        let result = validator.validate(&token).await;

        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_validate_wrong_issuer() {
        let signer = TestSigner::new("k1");
        let (validator, _server) = setup(&signer, vec![]).await;

        let token = signer.sign(&claims("https://sts.windows.net/other/", now() + 3600));
        let result = validator.validate(&token).await;

        assert!(matches!(result, Err(AuthError::InvalidIssuer)));
    }

    #[tokio::test]
    async fn test_validate_wrong_key() {
        let signer = TestSigner::new("k1");
        let (validator, _server) = setup(&signer, vec![]).await;

        let impostor = TestSigner::new("k1");
        let token = impostor.sign(&claims(ISSUER, now() + 3600));
        let result = validator.validate(&token).await;

        assert!(matches!(result, Err(AuthError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_validate_audience() {
        let signer = TestSigner::new("k1");

        let (validator, _server) = setup(&signer, vec!["client-id".to_string()]).await;
        let token = signer.sign(&claims(ISSUER, now() + 3600));
        assert!(validator.validate(&token).await.is_ok());

        let (validator, _server) = setup(&signer, vec!["other-client".to_string()]).await;
        let result = validator.validate(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidAudience)));
    }

    #[tokio::test]
    async fn test_validate_rejects_symmetric_tokens() {
        let signer = TestSigner::new("k1");
        let (validator, _server) = setup(&signer, vec![]).await;

        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &claims(ISSUER, now() + 3600),
            &jsonwebtoken::EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();

        assert!(matches!(
            validator.validate(&token).await,
            Err(AuthError::UnsupportedAlgorithm(Algorithm::HS256))
        ));
    }

    #[tokio::test]
    async fn test_validate_malformed_and_empty_token() {
        let signer = TestSigner::new("k1");
        let (validator, _server) = setup(&signer, vec![]).await;

        assert!(matches!(
            validator.validate("not.a.valid.token").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            validator.validate("").await,
            Err(AuthError::MissingToken)
        ));
    }
}
