//! Authenticator configuration types

use std::time::Duration;

use url::Url;

use super::error::{AuthError, Result};
use crate::constants::DEFAULT_AAD_ENDPOINT;

/// JWT validation settings
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Accepted `iss` values, compared exactly
    pub issuers: Vec<String>,
    /// Expected audience claims (must contain at least one match), empty to skip
    pub audience: Vec<String>,
    /// Clock skew tolerance for exp/nbf validation
    pub clock_skew: Duration,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuers: Vec::new(),
            audience: Vec::new(),
            clock_skew: Duration::from_secs(60),
        }
    }
}

impl JwtConfig {
    #[must_use]
    pub fn new(issuers: Vec<String>) -> Self {
        Self {
            issuers,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_audience(mut self, audience: Vec<String>) -> Self {
        self.audience = audience;
        self
    }
}

/// Azure AD authenticator settings
#[derive(Debug, Clone)]
pub struct AzureAuthConfig {
    pub aad_endpoint: Url,
    pub tenant_id: String,
    pub client_id: String,
    /// Require the client id in the token audience
    pub verify_clientid_in_audience: bool,
    /// Replaces the default v1 and v2 tenant issuers when set
    pub issuer: Option<String>,
    pub clock_skew: Duration,
    /// JWKS cache TTL
    pub jwks_cache_ttl: Duration,
    /// JWKS refresh interval for background refresh
    pub jwks_refresh_interval: Duration,
    pub timeout: Duration,
}

impl AzureAuthConfig {
    pub fn new(tenant_id: impl Into<String>, client_id: impl Into<String>) -> Result<Self> {
        let aad_endpoint = Url::parse(DEFAULT_AAD_ENDPOINT)
            .map_err(|e| AuthError::Config(format!("Invalid AAD endpoint: {e}")))?;

        Ok(Self {
            aad_endpoint,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            verify_clientid_in_audience: false,
            issuer: None,
            clock_skew: Duration::from_secs(60),
            jwks_cache_ttl: Duration::from_secs(3600),
            jwks_refresh_interval: Duration::from_secs(300),
            timeout: Duration::from_secs(10),
        })
    }

    #[must_use]
    pub fn with_aad_endpoint(mut self, endpoint: Url) -> Self {
        self.aad_endpoint = endpoint;
        self
    }

    #[must_use]
    pub const fn with_verify_clientid_in_audience(mut self, verify: bool) -> Self {
        self.verify_clientid_in_audience = verify;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    /// v2 issuer used for OIDC discovery, `{aadEndpoint}{tenant}/v2.0`
    pub fn discovery_issuer(&self) -> Result<Url> {
        self.aad_endpoint
            .join(&format!("{}/v2.0", self.tenant_id))
            .map_err(|e| AuthError::Config(format!("Invalid issuer URL: {e}")))
    }

    /// Issuers accepted in the `iss` claim
    pub fn accepted_issuers(&self) -> Result<Vec<String>> {
        if let Some(issuer) = &self.issuer {
            return Ok(vec![issuer.clone()]);
        }
        Ok(vec![
            format!("https://sts.windows.net/{}/", self.tenant_id),
            self.discovery_issuer()?.to_string(),
        ])
    }

    pub fn jwt_config(&self) -> Result<JwtConfig> {
        let audience = if self.verify_clientid_in_audience {
            vec![self.client_id.clone()]
        } else {
            Vec::new()
        };

        Ok(JwtConfig {
            issuers: self.accepted_issuers()?,
            audience,
            clock_skew: self.clock_skew,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(AuthError::Config("azure tenant id is required".into()));
        }
        if self.verify_clientid_in_audience && self.client_id.trim().is_empty() {
            return Err(AuthError::Config(
                "azure client id is required to verify the audience".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_issuers() {
        let config = AzureAuthConfig::new("tenant", "client").unwrap();

        assert_eq!(
            config.discovery_issuer().unwrap().as_str(),
            "https://login.microsoftonline.com/tenant/v2.0"
        );
        assert_eq!(
            config.accepted_issuers().unwrap(),
            vec![
                "https://sts.windows.net/tenant/".to_string(),
                "https://login.microsoftonline.com/tenant/v2.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_issuer_override() {
        let config = AzureAuthConfig::new("tenant", "client")
            .unwrap()
            .with_issuer(Some("https://issuer.example/".to_string()));

        assert_eq!(
            config.accepted_issuers().unwrap(),
            vec!["https://issuer.example/".to_string()]
        );
    }

    #[test]
    fn test_audience_only_when_verifying_client_id() {
        let config = AzureAuthConfig::new("tenant", "client").unwrap();
        assert!(config.jwt_config().unwrap().audience.is_empty());

        let config = config.with_verify_clientid_in_audience(true);
        assert_eq!(config.jwt_config().unwrap().audience, vec!["client"]);
    }

    #[test]
    fn test_validate() {
        assert!(AzureAuthConfig::new("", "client").unwrap().validate().is_err());
        assert!(
            AzureAuthConfig::new("tenant", "")
                .unwrap()
                .with_verify_clientid_in_audience(true)
                .validate()
                .is_err()
        );
        assert!(AzureAuthConfig::new("tenant", "").unwrap().validate().is_ok());
    }
}
