//! Token provider trait and the issuer response shape

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use super::error::{Result, TokenError};

/// Issuer response shared by the client-credential endpoint and the AKS broker
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    #[serde(default)]
    pub token_type: String,
    /// Lifetime in seconds; issuers send either a number or a numeric string
    #[serde(deserialize_with = "deserialize_seconds")]
    pub expires_in: u64,
    pub access_token: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Source of bearer tokens for the remote policy API
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Acquire a fresh token for `scope`
    async fn acquire(&self, scope: &str) -> Result<TokenResponse>;

    /// Stable provider name for logs and metrics
    fn name(&self) -> &'static str;
}

/// Check the status and decode a token issuer response
pub(super) async fn read_token_response(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<TokenResponse> {
    let status = response.status();
    let body = response.bytes().await.map_err(|source| TokenError::Request {
        endpoint: endpoint.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(TokenError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    serde_json::from_slice(&body).map_err(|e| TokenError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}
