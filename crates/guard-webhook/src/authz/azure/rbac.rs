//! Client for the ARM check-access API

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use url::Url;

use super::checkaccess::{
    convert_check_access_response, join_path, namespace_scope, prepare_check_access_body,
    result_cache_key,
};
use crate::cache::DecisionStore;
use crate::constants::{
    ACCESS_ALLOWED_VERDICT, ACCESS_NOT_ALLOWED_VERDICT, CHECK_ACCESS_API_VERSION,
    CHECK_ACCESS_PATH, CONNECTED_CLUSTERS, MANAGED_CLUSTERS, REMAINING_SUBSCRIPTION_READS_HEADER,
};
use crate::helpers::{build_http_client, truncate_body};
use crate::observability;
use crate::token::TokenCredentialManager;
use crate::types::{AccessDecision, AccessRequest};
use crate::{Error, Result};

const MAX_ERROR_BODY_LEN: usize = 1024;

/// Kind of cluster the authorizer protects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClusterType {
    /// Managed cluster
    #[default]
    Aks,
    /// Connected cluster
    Arc,
}

impl ClusterType {
    /// Resource provider namespace used as the data action prefix
    #[must_use]
    pub const fn provider_namespace(self) -> &'static str {
        match self {
            Self::Aks => MANAGED_CLUSTERS,
            Self::Arc => CONNECTED_CLUSTERS,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aks => "aks",
            Self::Arc => "arc",
        }
    }
}

impl FromStr for ClusterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aks" => Ok(Self::Aks),
            "arc" => Ok(Self::Arc),
            other => Err(Error::Config(format!(
                "unsupported azure authz mode '{other}', expected 'aks' or 'arc'"
            ))),
        }
    }
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for [`RbacClient`]
#[derive(Debug, Clone)]
pub struct RbacOptions {
    pub arm_endpoint: Url,
    pub cluster_type: ClusterType,
    pub resource_id: String,
    /// Remaining-read headroom below which outbound connections are rotated
    pub arm_call_limit: i64,
    pub skip_check: Vec<String>,
    pub retrieve_group_memberships: bool,
    pub skip_authz_for_non_aad_users: bool,
    pub timeout: Duration,
}

/// Policy client backed by the ARM check-access endpoint.
///
/// Decisions are cached by [`result_cache_key`]. The outbound client sits
/// behind an [`ArcSwap`] so a throttle signal can replace it without
/// disturbing calls that already hold the old one.
pub struct RbacClient {
    http: ArcSwap<reqwest::Client>,
    options: RbacOptions,
    skip_check: HashSet<String>,
    tokens: Arc<TokenCredentialManager>,
    store: Arc<dyn DecisionStore>,
}

impl std::fmt::Debug for RbacClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacClient")
            .field("options", &self.options)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl RbacClient {
    pub fn new(
        options: RbacOptions,
        tokens: Arc<TokenCredentialManager>,
        store: Arc<dyn DecisionStore>,
    ) -> Result<Self> {
        if options.resource_id.trim().is_empty() {
            return Err(Error::Config("azure resource id must not be empty".into()));
        }

        let http = build_http_client(options.timeout)
            .map_err(|e| Error::Config(format!("failed to build ARM client: {e}")))?;
        let skip_check = options
            .skip_check
            .iter()
            .map(|user| user.to_lowercase())
            .collect();

        Ok(Self {
            http: ArcSwap::from_pointee(http),
            options,
            skip_check,
            tokens,
            store,
        })
    }

    #[must_use]
    pub const fn cluster_type(&self) -> ClusterType {
        self.options.cluster_type
    }

    #[must_use]
    pub const fn should_skip_authz_check_for_non_aad_users(&self) -> bool {
        self.options.skip_authz_for_non_aad_users
    }

    /// True for connected clusters when the username is on the skip list
    #[must_use]
    pub fn skip_authz_check(&self, request: &AccessRequest) -> bool {
        self.options.cluster_type == ClusterType::Arc
            && self.skip_check.contains(&request.user.to_lowercase())
    }

    /// Check-access URL for the request's scope
    pub fn check_access_url(&self, request: &AccessRequest) -> Url {
        let namespace = namespace_scope(request).unwrap_or_default();
        let path = join_path([
            self.options.arm_endpoint.path(),
            self.options.resource_id.as_str(),
            namespace.as_str(),
            CHECK_ACCESS_PATH,
        ]);

        let mut url = self.options.arm_endpoint.clone();
        url.set_path(&path);
        url.set_query(Some(&format!("api-version={CHECK_ACCESS_API_VERSION}")));
        url
    }

    /// Resolve a decision from the cache or the remote API.
    ///
    /// A parsed response is cached as returned. An unparsable response is
    /// cached as a deny. Non-success statuses and transport failures are
    /// returned without touching the cache.
    pub async fn check_access(&self, request: &AccessRequest) -> Result<AccessDecision> {
        let key = result_cache_key(request);

        if let Some(allowed) = self.store.get(&key) {
            tracing::debug!(key = %key, allowed, "Serving cached decision");
            return Ok(cached_decision(allowed));
        }

        let body = prepare_check_access_body(
            request,
            self.options.cluster_type.provider_namespace(),
            &self.options.resource_id,
            self.options.retrieve_group_memberships,
        )?;
        let url = self.check_access_url(request);
        let endpoint = url.path().to_string();

        let token = self.tokens.bearer_token().await?;

        tracing::debug!(key = %key, endpoint = %endpoint, "Sending check access request");

        let client = self.http.load_full();
        let started = Instant::now();
        let response = client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| {
                tracing::error!(endpoint = %endpoint, error = %source, "Check access request failed");
                Error::UpstreamTransport {
                    endpoint: endpoint.clone(),
                    source,
                }
            })?;
        drop(client);

        let status = response.status();
        observability::record_arm_call(status.as_u16(), started.elapsed());

        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                endpoint = %endpoint,
                status = status.as_u16(),
                key = %key,
                "Check access returned non-success status"
            );
            if status == StatusCode::TOO_MANY_REQUESTS {
                tracing::warn!(key = %key, "ARM throttled check access, rotating connections");
                self.rotate_connections("status_429");
            }
            return Err(Error::Upstream {
                endpoint,
                status: status.as_u16(),
                body: truncate_body(&body, MAX_ERROR_BODY_LEN),
            });
        }

        if let Some(remaining) = remaining_reads(response.headers())
            && remaining < self.options.arm_call_limit
        {
            tracing::warn!(
                remaining,
                limit = self.options.arm_call_limit,
                key = %key,
                "ARM read quota below limit, rotating connections"
            );
            self.rotate_connections("low_quota");
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| Error::UpstreamTransport {
                endpoint: endpoint.clone(),
                source,
            })?;

        match convert_check_access_response(&bytes) {
            Ok(decision) => {
                self.remember(&key, decision.allowed);
                Ok(decision)
            }
            Err(message) => {
                tracing::error!(endpoint = %endpoint, key = %key, error = %message, "Failed to decode check access response");
                self.remember(&key, false);
                Err(Error::UpstreamDecode { endpoint, message })
            }
        }
    }

    fn remember(&self, key: &str, allowed: bool) {
        if let Err(e) = self.store.set(key, allowed) {
            tracing::warn!(key = %key, error = %e, "Decision not cached");
        }
    }

    /// Swap in a fresh outbound client; idle connections of the old one close
    /// when the last in-flight call releases it
    fn rotate_connections(&self, cause: &'static str) {
        observability::record_arm_throttle(cause);
        match build_http_client(self.options.timeout) {
            Ok(client) => self.http.store(Arc::new(client)),
            Err(e) => tracing::warn!(error = %e, "Failed to rebuild ARM client, keeping current one"),
        }
    }
}

fn cached_decision(allowed: bool) -> AccessDecision {
    if allowed {
        AccessDecision::allow(ACCESS_ALLOWED_VERDICT)
    } else {
        AccessDecision::deny(ACCESS_NOT_ALLOWED_VERDICT)
    }
}

fn remaining_reads(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(REMAINING_SUBSCRIPTION_READS_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::cache::{CacheConfig, ShardedCache};
    use crate::token::{TokenProvider, TokenResponse};
    use crate::types::ResourceAttributes;

    const OID: &str = "00000000-0000-0000-0000-000000000000";
    const RESOURCE_ID: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Kubernetes/connectedClusters/c1";
    const CHECK_ACCESS: &str = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Kubernetes/connectedClusters/c1/namespaces/dev/providers/Microsoft.Authorization/checkaccess";

    struct StaticTokenProvider;

    #[async_trait]
    impl TokenProvider for StaticTokenProvider {
        async fn acquire(&self, _scope: &str) -> crate::token::Result<TokenResponse> {
            Ok(TokenResponse {
                token_type: "Bearer".to_string(),
                expires_in: 3600,
                access_token: "arm-token".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "StaticTokenProvider"
        }
    }

    fn options(arm_endpoint: &str) -> RbacOptions {
        RbacOptions {
            arm_endpoint: Url::parse(arm_endpoint).unwrap(),
            cluster_type: ClusterType::Arc,
            resource_id: RESOURCE_ID.to_string(),
            arm_call_limit: 2000,
            skip_check: vec!["Skip@Example.com".to_string()],
            retrieve_group_memberships: true,
            skip_authz_for_non_aad_users: true,
            timeout: Duration::from_secs(5),
        }
    }

    fn client_with_store(arm_endpoint: &str, store: Arc<dyn DecisionStore>) -> RbacClient {
        let tokens = Arc::new(TokenCredentialManager::new(
            Arc::new(StaticTokenProvider),
            "https://management.azure.com/.default",
        ));
        RbacClient::new(options(arm_endpoint), tokens, store).unwrap()
    }

    fn client(arm_endpoint: &str) -> (RbacClient, Arc<ShardedCache>) {
        let cache = Arc::new(ShardedCache::new(CacheConfig::default()).unwrap());
        let store: Arc<dyn DecisionStore> = cache.clone();
        (client_with_store(arm_endpoint, store), cache)
    }

    fn delete_pods() -> AccessRequest {
        AccessRequest::resource(
            "beta@bing.com",
            ResourceAttributes {
                namespace: "dev".to_string(),
                verb: "delete".to_string(),
                resource: "pods".to_string(),
                ..Default::default()
            },
        )
        .with_extra("oid", vec![OID.to_string()])
    }

    #[test]
    fn test_cluster_type_parse() {
        assert_eq!("aks".parse::<ClusterType>().unwrap(), ClusterType::Aks);
        assert_eq!("ARC".parse::<ClusterType>().unwrap(), ClusterType::Arc);
        assert!("gke".parse::<ClusterType>().unwrap_err().is_config());
        assert_eq!(ClusterType::Arc.provider_namespace(), CONNECTED_CLUSTERS);
        assert_eq!(ClusterType::Aks.provider_namespace(), MANAGED_CLUSTERS);
    }

    #[test]
    fn test_remaining_reads() {
        let mut headers = HeaderMap::new();
        assert_eq!(remaining_reads(&headers), None);

        headers.insert(REMAINING_SUBSCRIPTION_READS_HEADER, "11999".parse().unwrap());
        assert_eq!(remaining_reads(&headers), Some(11_999));

        headers.insert(REMAINING_SUBSCRIPTION_READS_HEADER, "many".parse().unwrap());
        assert_eq!(remaining_reads(&headers), None);
    }

    #[tokio::test]
    async fn test_empty_resource_id_rejected() {
        let mut opts = options("https://management.azure.com/");
        opts.resource_id = "  ".to_string();
        let tokens = Arc::new(TokenCredentialManager::new(
            Arc::new(StaticTokenProvider),
            "scope",
        ));
        let store: Arc<dyn DecisionStore> =
            Arc::new(ShardedCache::new(CacheConfig::default()).unwrap());

        let err = RbacClient::new(opts, tokens, store).unwrap_err();
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_check_access_url() {
        let (client, _) = client("https://management.azure.com/");

        let url = client.check_access_url(&delete_pods());
        assert_eq!(
            url.as_str(),
            format!("https://management.azure.com{CHECK_ACCESS}?api-version=2018-09-01-preview")
        );

        let cluster_scoped = AccessRequest::resource(
            "beta@bing.com",
            ResourceAttributes {
                resource: "nodes".to_string(),
                verb: "list".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(
            client.check_access_url(&cluster_scoped).path(),
            format!("{RESOURCE_ID}/providers/Microsoft.Authorization/checkaccess")
        );
    }

    #[tokio::test]
    async fn test_skip_authz_check_is_case_insensitive_and_arc_only() {
        let (client, _) = client("https://management.azure.com/");

        let mut request = delete_pods();
        request.user = "SKIP@example.COM".to_string();
        assert!(client.skip_authz_check(&request));

        request.user = "other@example.com".to_string();
        assert!(!client.skip_authz_check(&request));

        let mut opts = options("https://management.azure.com/");
        opts.cluster_type = ClusterType::Aks;
        let tokens = Arc::new(TokenCredentialManager::new(
            Arc::new(StaticTokenProvider),
            "scope",
        ));
        let store: Arc<dyn DecisionStore> =
            Arc::new(ShardedCache::new(CacheConfig::default()).unwrap());
        let aks = RbacClient::new(opts, tokens, store).unwrap();

        request.user = "skip@example.com".to_string();
        assert!(!aks.skip_authz_check(&request));
    }

    #[tokio::test]
    async fn test_check_access_allowed_then_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .and(query_param("api-version", CHECK_ACCESS_API_VERSION))
            .and(header("authorization", "Bearer arm-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"accessDecision":"Allowed","actionId":"Microsoft.Kubernetes/connectedClusters/pods/delete","isDataAction":true,"roleAssignment":null,"denyAssignment":null,"timeToLiveInMs":300000}]"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let (client, cache) = client(&server.uri());

        let decision = client.check_access(&delete_pods()).await.unwrap();
        assert!(decision.allowed);
        assert!(!decision.denied);

        let decision = client.check_access(&delete_pods()).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, ACCESS_ALLOWED_VERDICT);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_check_access_sends_expected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .and(wiremock::matchers::body_json(serde_json::json!({
                "Subject": {
                    "Attributes": {
                        "ObjectId": OID,
                        "xms-pasrp-retrievegroupmemberships": true
                    }
                },
                "Actions": [{
                    "Id": "Microsoft.Kubernetes/connectedClusters/pods/delete",
                    "IsDataAction": true
                }],
                "Resource": { "Id": format!("{RESOURCE_ID}/namespaces/dev") }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"[{"accessDecision":"NotAllowed"}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let decision = client.check_access(&delete_pods()).await.unwrap();

        assert!(!decision.allowed);
        assert!(decision.denied);
        assert_eq!(decision.reason, ACCESS_NOT_ALLOWED_VERDICT);
    }

    #[tokio::test]
    async fn test_check_access_decode_failure_caches_deny() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .expect(1)
            .mount(&server)
            .await;

        let (client, cache) = client(&server.uri());

        let err = client.check_access(&delete_pods()).await.unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(cache.get("beta@bing.com/dev/pods/delete"), Some(false));

        let decision = client.check_access(&delete_pods()).await.unwrap();
        assert!(decision.denied);
    }

    #[tokio::test]
    async fn test_check_access_error_status_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
            .expect(2)
            .mount(&server)
            .await;

        let (client, cache) = client(&server.uri());

        for _ in 0..2 {
            let err = client.check_access(&delete_pods()).await.unwrap_err();
            match err {
                Error::Upstream { status, body, .. } => {
                    assert_eq!(status, 500);
                    assert_eq!(body, "internal");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_too_many_requests_rotates_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let before = client.http.load_full();

        let err = client.check_access(&delete_pods()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 429, .. }));
        assert!(!Arc::ptr_eq(&before, &client.http.load_full()));
    }

    #[tokio::test]
    async fn test_low_quota_rotates_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(REMAINING_SUBSCRIPTION_READS_HEADER, "10")
                    .set_body_string(r#"[{"accessDecision":"Allowed"}]"#),
            )
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let before = client.http.load_full();

        let decision = client.check_access(&delete_pods()).await.unwrap();
        assert!(decision.allowed);
        assert!(!Arc::ptr_eq(&before, &client.http.load_full()));
    }

    #[tokio::test]
    async fn test_ample_quota_keeps_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHECK_ACCESS))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(REMAINING_SUBSCRIPTION_READS_HEADER, "11999")
                    .set_body_string(r#"[{"accessDecision":"Allowed"}]"#),
            )
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let before = client.http.load_full();

        client.check_access(&delete_pods()).await.unwrap();
        assert!(Arc::ptr_eq(&before, &client.http.load_full()));
    }

    #[tokio::test]
    async fn test_missing_oid_fails_before_remote_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, _) = client(&server.uri());
        let mut request = delete_pods();
        request.extra.clear();

        let err = client.check_access(&request).await.unwrap_err();
        assert!(err.is_credential());
    }
}
