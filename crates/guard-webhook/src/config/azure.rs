//! Azure provider configuration

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::auth::AzureAuthConfig;
use crate::authz::{ClusterType, RbacOptions};
use crate::token::{AksTokenProvider, ClientCredentialTokenProvider, TokenProvider};
use crate::{Error, Result};

/// How the ARM bearer token is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenStrategy {
    /// OAuth2 client-credential exchange against AAD
    #[default]
    ClientCredential,
    /// Token broker provided by the managed cluster
    Aks,
}

impl FromStr for TokenStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "client-credential" | "clientcredential" => Ok(Self::ClientCredential),
            "aks" => Ok(Self::Aks),
            other => Err(Error::Config(format!(
                "unsupported azure token strategy '{other}', expected 'client-credential' or 'aks'"
            ))),
        }
    }
}

/// Settings for the Azure authenticator and authorizer
#[derive(Clone)]
pub struct AzureConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub aad_endpoint: Url,
    pub arm_endpoint: Url,
    pub cluster_type: ClusterType,
    pub resource_id: String,
    pub token_strategy: TokenStrategy,
    pub aks_token_url: Option<Url>,
    pub arm_call_limit: i64,
    pub timeout: Duration,
    pub skip_authz_check: Vec<String>,
    pub retrieve_group_memberships: bool,
    pub skip_authz_for_non_aad_users: bool,
    pub verify_clientid_in_audience: bool,
    pub issuer: Option<String>,
}

impl std::fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("aad_endpoint", &self.aad_endpoint.as_str())
            .field("arm_endpoint", &self.arm_endpoint.as_str())
            .field("cluster_type", &self.cluster_type)
            .field("resource_id", &self.resource_id)
            .field("token_strategy", &self.token_strategy)
            .field("aks_token_url", &self.aks_token_url.as_ref().map(Url::as_str))
            .field("arm_call_limit", &self.arm_call_limit)
            .field("timeout", &self.timeout)
            .field("skip_authz_check", &self.skip_authz_check)
            .field("retrieve_group_memberships", &self.retrieve_group_memberships)
            .field(
                "skip_authz_for_non_aad_users",
                &self.skip_authz_for_non_aad_users,
            )
            .field(
                "verify_clientid_in_audience",
                &self.verify_clientid_in_audience,
            )
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl AzureConfig {
    /// OAuth2 scope requested for ARM, `{armEndpoint}.default`
    #[must_use]
    pub fn token_scope(&self) -> String {
        format!("{}.default", self.arm_endpoint)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(Error::Config("azure tenant id is required".into()));
        }
        if self.resource_id.trim().is_empty() {
            return Err(Error::Config("azure resource id is required".into()));
        }

        match self.token_strategy {
            TokenStrategy::ClientCredential => {
                if self.client_id.trim().is_empty() {
                    return Err(Error::Config(
                        "azure client id is required for client-credential tokens".into(),
                    ));
                }
                if self.client_secret.as_deref().is_none_or(|s| s.is_empty()) {
                    return Err(Error::Config(
                        "azure client secret is required for client-credential tokens".into(),
                    ));
                }
            }
            TokenStrategy::Aks => {
                if self.aks_token_url.is_none() {
                    return Err(Error::Config(
                        "azure aks token url is required for the aks token strategy".into(),
                    ));
                }
            }
        }

        if self.verify_clientid_in_audience && self.client_id.trim().is_empty() {
            return Err(Error::Config(
                "azure client id is required to verify the audience".into(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn rbac_options(&self) -> RbacOptions {
        RbacOptions {
            arm_endpoint: self.arm_endpoint.clone(),
            cluster_type: self.cluster_type,
            resource_id: self.resource_id.clone(),
            arm_call_limit: self.arm_call_limit,
            skip_check: self.skip_authz_check.clone(),
            retrieve_group_memberships: self.retrieve_group_memberships,
            skip_authz_for_non_aad_users: self.skip_authz_for_non_aad_users,
            timeout: self.timeout,
        }
    }

    pub fn auth_config(&self) -> Result<AzureAuthConfig> {
        let mut config = AzureAuthConfig::new(self.tenant_id.clone(), self.client_id.clone())?
            .with_aad_endpoint(self.aad_endpoint.clone())
            .with_verify_clientid_in_audience(self.verify_clientid_in_audience)
            .with_issuer(self.issuer.clone());
        config.timeout = self.timeout;
        Ok(config)
    }

    /// Build the token provider for the configured strategy
    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>> {
        let provider: Arc<dyn TokenProvider> = match self.token_strategy {
            TokenStrategy::ClientCredential => Arc::new(ClientCredentialTokenProvider::new(
                &self.aad_endpoint,
                &self.tenant_id,
                self.client_id.clone(),
                self.client_secret.clone().unwrap_or_default(),
                self.timeout,
            )?),
            TokenStrategy::Aks => {
                let url = self.aks_token_url.clone().ok_or_else(|| {
                    Error::Config("azure aks token url is required".into())
                })?;
                Arc::new(AksTokenProvider::new(
                    url,
                    self.tenant_id.clone(),
                    self.timeout,
                )?)
            }
        };
        Ok(provider)
    }
}
