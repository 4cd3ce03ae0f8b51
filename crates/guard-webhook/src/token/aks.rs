//! Token provider backed by the AKS token broker

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use super::error::{Result, TokenError};
use super::provider::{TokenProvider, TokenResponse, read_token_response};
use crate::constants::AKS_PROVIDER_NAME;
use crate::helpers::build_http_client;

#[derive(Debug, Serialize)]
struct BrokerRequest<'a> {
    #[serde(rename = "tenantID")]
    tenant_id: &'a str,
}

/// Asks the platform broker for a token on behalf of the cluster's tenant.
///
/// The broker decides the audience itself, so the requested scope is ignored.
#[derive(Debug)]
pub struct AksTokenProvider {
    http: reqwest::Client,
    token_url: Url,
    tenant_id: String,
}

impl AksTokenProvider {
    pub fn new(token_url: Url, tenant_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = build_http_client(timeout)
            .map_err(|e| TokenError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            token_url,
            tenant_id: tenant_id.into(),
        })
    }
}

#[async_trait]
impl TokenProvider for AksTokenProvider {
    async fn acquire(&self, _scope: &str) -> Result<TokenResponse> {
        let endpoint = self.token_url.as_str();

        let response = self
            .http
            .post(self.token_url.clone())
            .json(&BrokerRequest {
                tenant_id: &self.tenant_id,
            })
            .send()
            .await
            .map_err(|source| TokenError::Request {
                endpoint: endpoint.to_string(),
                source,
            })?;

        read_token_response(endpoint, response).await
    }

    fn name(&self) -> &'static str {
        AKS_PROVIDER_NAME
    }
}
