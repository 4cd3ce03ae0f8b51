//! OIDC discovery using the openidconnect crate
//!
//! Only the provider metadata is used; the JWKS URI it advertises seeds the
//! [`JwksCache`](super::JwksCache).

use std::time::Duration;

use openidconnect::IssuerUrl;
use openidconnect::core::CoreProviderMetadata;
use url::Url;

use super::error::{AuthError, Result};

/// Discover the JWKS URI advertised by `issuer`
pub async fn discover_jwks_uri(issuer: &Url, timeout: Duration) -> Result<Url> {
    tracing::info!(issuer = %issuer, "Discovering OIDC provider");

    // The v2 issuer has no trailing slash; discovery must match it exactly
    let issuer_url = IssuerUrl::new(issuer.as_str().trim_end_matches('/').to_string())
        .map_err(|e| AuthError::Config(format!("Invalid issuer URL: {e}")))?;

    // Use the reqwest client that openidconnect re-exports to avoid version conflicts
    let http_client = openidconnect::reqwest::Client::builder()
        .timeout(timeout)
        .redirect(openidconnect::reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AuthError::Config(format!("Failed to create HTTP client: {e}")))?;

    let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
        .await
        .map_err(|e| AuthError::DiscoveryFailed(e.to_string()))?;

    let jwks_uri = Url::parse(provider_metadata.jwks_uri().as_str())
        .map_err(|e| AuthError::Config(format!("Invalid JWKS URI: {e}")))?;

    tracing::info!(jwks_uri = %jwks_uri, "OIDC discovery complete");
    Ok(jwks_uri)
}
