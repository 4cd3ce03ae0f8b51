//! Organization to provider mapping
//!
//! The Organization RDN of a client certificate selects which provider
//! answers the request. Providers are registered once at startup; the
//! registry is read-only afterwards and shared behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{AccessDecision, AccessRequest, Identity};
use crate::{Error, Result};

/// Turns a bearer credential into an [`Identity`]
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Identity>;

    fn name(&self) -> &'static str;
}

/// Answers access requests
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn check(&self, request: &AccessRequest) -> Result<AccessDecision>;

    fn name(&self) -> &'static str;
}

#[derive(Clone, Default)]
struct Provider {
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

/// Case-insensitive registry of providers keyed by organization
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Provider>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (org, provider) in &self.providers {
            map.entry(
                org,
                &(
                    provider.authenticator.as_ref().map(|a| a.name()),
                    provider.authorizer.as_ref().map(|a| a.name()),
                ),
            );
        }
        map.finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register capabilities for an organization.
    ///
    /// Registering the same organization twice replaces only the capabilities
    /// passed as `Some`.
    pub fn register(
        &mut self,
        org: &str,
        authenticator: Option<Arc<dyn Authenticator>>,
        authorizer: Option<Arc<dyn Authorizer>>,
    ) {
        let entry = self.providers.entry(org.to_lowercase()).or_default();
        if authenticator.is_some() {
            entry.authenticator = authenticator;
        }
        if authorizer.is_some() {
            entry.authorizer = authorizer;
        }
        tracing::info!(
            org = %org.to_lowercase(),
            authenticator = entry.authenticator.is_some(),
            authorizer = entry.authorizer.is_some(),
            "Registered provider"
        );
    }

    #[must_use]
    pub fn has(&self, org: &str) -> bool {
        self.providers.contains_key(&org.to_lowercase())
    }

    pub fn authenticator_for(&self, org: &str) -> Result<Arc<dyn Authenticator>> {
        self.providers
            .get(&org.to_lowercase())
            .and_then(|p| p.authenticator.clone())
            .ok_or_else(|| Error::UnsupportedOrganization(org.to_string()))
    }

    pub fn authorizer_for(&self, org: &str) -> Result<Arc<dyn Authorizer>> {
        self.providers
            .get(&org.to_lowercase())
            .and_then(|p| p.authorizer.clone())
            .ok_or_else(|| Error::UnsupportedOrganization(org.to_string()))
    }

    /// Registered organizations, sorted
    #[must_use]
    pub fn organizations(&self) -> Vec<&str> {
        let mut orgs: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        orgs.sort_unstable();
        orgs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
