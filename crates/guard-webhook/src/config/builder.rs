//! Configuration builder

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use super::azure::{AzureConfig, TokenStrategy};
use crate::Error;
use crate::authz::ClusterType;
use crate::cache::CacheConfig;
use crate::constants::{DEFAULT_AAD_ENDPOINT, DEFAULT_ARM_CALL_LIMIT, DEFAULT_ARM_ENDPOINT, ORG_AZURE};

/// Organizations with an in-tree backend
pub const SUPPORTED_PROVIDERS: &[&str] = &[ORG_AZURE];

/// Webhook server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    /// Organizations to register, lowercased
    pub providers: Vec<String>,
    /// Present when `azure` is listed in `providers`
    pub azure: Option<AzureConfig>,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub const fn server(&self) -> &ServerConfig {
        &self.server
    }

    #[must_use]
    pub const fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    #[must_use]
    pub const fn azure(&self) -> Option<&AzureConfig> {
        self.azure.as_ref()
    }
}

/// Listener, TLS material and server timeouts
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
    /// CA bundle used to verify client certificates
    pub client_ca_file: Option<PathBuf>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub handshake_timeout: Duration,
}

/// Telemetry configuration
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub log_level: String,
    pub json_logs: bool,
}

#[derive(Debug)]
struct ServerSettings {
    listen_addr: SocketAddr,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    client_ca_file: Option<PathBuf>,
    read_timeout: Duration,
    write_timeout: Duration,
    handshake_timeout: Duration,
}

#[derive(Debug)]
struct AzureSettings {
    tenant_id: String,
    client_id: String,
    client_secret: Option<String>,
    aad_endpoint: Option<Url>,
    arm_endpoint: Option<Url>,
    cluster_type: ClusterType,
    resource_id: String,
    token_strategy: TokenStrategy,
    aks_token_url: Option<Url>,
    arm_call_limit: i64,
    timeout: Duration,
    skip_authz_check: Vec<String>,
    retrieve_group_memberships: bool,
    skip_authz_for_non_aad_users: bool,
    verify_clientid_in_audience: bool,
    issuer: Option<String>,
}

/// Configuration builder with fluent API
#[derive(Debug)]
pub struct ConfigBuilder {
    server: ServerSettings,
    providers: Vec<String>,
    azure: AzureSettings,
    cache: CacheConfig,
    telemetry: TelemetryConfig,
}

impl ConfigBuilder {
    pub const DEFAULT_LISTEN_ADDR: SocketAddr =
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8443));

    #[must_use]
    pub const fn new() -> Self {
        Self {
            server: ServerSettings {
                listen_addr: Self::DEFAULT_LISTEN_ADDR,
                cert_file: None,
                key_file: None,
                client_ca_file: None,
                read_timeout: Duration::from_secs(5),
                write_timeout: Duration::from_secs(10),
                handshake_timeout: Duration::from_secs(10),
            },
            providers: Vec::new(),
            azure: AzureSettings {
                tenant_id: String::new(),
                client_id: String::new(),
                client_secret: None,
                aad_endpoint: None,
                arm_endpoint: None,
                cluster_type: ClusterType::Aks,
                resource_id: String::new(),
                token_strategy: TokenStrategy::ClientCredential,
                aks_token_url: None,
                arm_call_limit: DEFAULT_ARM_CALL_LIMIT,
                timeout: Duration::from_secs(10),
                skip_authz_check: Vec::new(),
                retrieve_group_memberships: true,
                skip_authz_for_non_aad_users: true,
                verify_clientid_in_audience: false,
                issuer: None,
            },
            cache: CacheConfig {
                shards: crate::cache::DEFAULT_SHARDS,
                max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
                max_entry_size: crate::cache::DEFAULT_MAX_ENTRY_SIZE,
                life_window: crate::cache::DEFAULT_LIFE_WINDOW,
                clean_window: crate::cache::DEFAULT_CLEAN_WINDOW,
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: None,
                service_name: String::new(),
                log_level: String::new(),
                json_logs: false,
            },
        }
    }

    // Server

    #[must_use]
    pub const fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.server.listen_addr = addr;
        self
    }

    #[must_use]
    pub fn cert_file(mut self, path: PathBuf) -> Self {
        self.server.cert_file = Some(path);
        self
    }

    #[must_use]
    pub fn key_file(mut self, path: PathBuf) -> Self {
        self.server.key_file = Some(path);
        self
    }

    #[must_use]
    pub fn client_ca_file(mut self, path: PathBuf) -> Self {
        self.server.client_ca_file = Some(path);
        self
    }

    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.server.read_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.server.write_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.server.handshake_timeout = timeout;
        self
    }

    // Providers

    /// Replace the registered organizations
    #[must_use]
    pub fn providers(mut self, providers: Vec<String>) -> Self {
        self.providers = providers
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    // Azure

    #[must_use]
    pub fn azure_tenant_id(mut self, tenant_id: String) -> Self {
        self.azure.tenant_id = tenant_id;
        self
    }

    #[must_use]
    pub fn azure_client_id(mut self, client_id: String) -> Self {
        self.azure.client_id = client_id;
        self
    }

    #[must_use]
    pub fn azure_client_secret(mut self, secret: String) -> Self {
        self.azure.client_secret = Some(secret);
        self
    }

    #[must_use]
    pub fn azure_aad_endpoint(mut self, endpoint: Url) -> Self {
        self.azure.aad_endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub fn azure_arm_endpoint(mut self, endpoint: Url) -> Self {
        self.azure.arm_endpoint = Some(endpoint);
        self
    }

    #[must_use]
    pub const fn azure_cluster_type(mut self, cluster_type: ClusterType) -> Self {
        self.azure.cluster_type = cluster_type;
        self
    }

    #[must_use]
    pub fn azure_resource_id(mut self, resource_id: String) -> Self {
        self.azure.resource_id = resource_id;
        self
    }

    #[must_use]
    pub const fn azure_token_strategy(mut self, strategy: TokenStrategy) -> Self {
        self.azure.token_strategy = strategy;
        self
    }

    #[must_use]
    pub fn azure_aks_token_url(mut self, url: Url) -> Self {
        self.azure.aks_token_url = Some(url);
        self
    }

    #[must_use]
    pub const fn azure_arm_call_limit(mut self, limit: i64) -> Self {
        self.azure.arm_call_limit = limit;
        self
    }

    #[must_use]
    pub const fn azure_timeout(mut self, timeout: Duration) -> Self {
        self.azure.timeout = timeout;
        self
    }

    #[must_use]
    pub fn azure_skip_authz_check(mut self, usernames: Vec<String>) -> Self {
        self.azure.skip_authz_check = usernames;
        self
    }

    #[must_use]
    pub const fn azure_retrieve_group_memberships(mut self, enabled: bool) -> Self {
        self.azure.retrieve_group_memberships = enabled;
        self
    }

    #[must_use]
    pub const fn azure_skip_authz_for_non_aad_users(mut self, enabled: bool) -> Self {
        self.azure.skip_authz_for_non_aad_users = enabled;
        self
    }

    #[must_use]
    pub const fn azure_verify_clientid_in_audience(mut self, enabled: bool) -> Self {
        self.azure.verify_clientid_in_audience = enabled;
        self
    }

    #[must_use]
    pub fn azure_issuer(mut self, issuer: String) -> Self {
        self.azure.issuer = Some(issuer);
        self
    }

    // Cache

    #[must_use]
    pub const fn cache_shards(mut self, shards: usize) -> Self {
        self.cache.shards = shards;
        self
    }

    #[must_use]
    pub const fn cache_max_entries(mut self, max: usize) -> Self {
        self.cache.max_entries = max;
        self
    }

    #[must_use]
    pub const fn cache_max_entry_size(mut self, max: usize) -> Self {
        self.cache.max_entry_size = max;
        self
    }

    #[must_use]
    pub const fn cache_life_window(mut self, window: Duration) -> Self {
        self.cache.life_window = window;
        self
    }

    #[must_use]
    pub const fn cache_clean_window(mut self, window: Duration) -> Self {
        self.cache.clean_window = window;
        self
    }

    // Observability

    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.telemetry.otlp_endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn service_name(mut self, name: String) -> Self {
        self.telemetry.service_name = name;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: String) -> Self {
        self.telemetry.log_level = level;
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.telemetry.json_logs = enabled;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the TLS pair is missing, a provider has no
    /// backend, the azure section is incomplete, or the cache settings are invalid.
    pub fn build(self) -> crate::Result<Config> {
        let (Some(cert_file), Some(key_file)) = (self.server.cert_file, self.server.key_file)
        else {
            return Err(Error::Config(
                "a TLS cert/key pair is required to serve".into(),
            ));
        };

        if let Some(unknown) = self
            .providers
            .iter()
            .find(|p| !SUPPORTED_PROVIDERS.contains(&p.as_str()))
        {
            return Err(Error::Config(format!(
                "provider '{unknown}' is not supported"
            )));
        }

        self.cache
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let azure = if self.providers.iter().any(|p| p == ORG_AZURE) {
            let azure = build_azure(self.azure)?;
            azure.validate()?;
            Some(azure)
        } else {
            None
        };

        let service_name = if self.telemetry.service_name.is_empty() {
            "guard-webhook".to_string()
        } else {
            self.telemetry.service_name
        };

        let log_level = if self.telemetry.log_level.is_empty() {
            "info".to_string()
        } else {
            self.telemetry.log_level
        };

        Ok(Config {
            server: ServerConfig {
                listen_addr: self.server.listen_addr,
                cert_file,
                key_file,
                client_ca_file: self.server.client_ca_file,
                read_timeout: self.server.read_timeout,
                write_timeout: self.server.write_timeout,
                handshake_timeout: self.server.handshake_timeout,
            },
            providers: self.providers,
            azure,
            cache: self.cache,
            telemetry: TelemetryConfig {
                otlp_endpoint: self.telemetry.otlp_endpoint,
                service_name,
                log_level,
                json_logs: self.telemetry.json_logs,
            },
        })
    }
}

fn build_azure(settings: AzureSettings) -> crate::Result<AzureConfig> {
    let aad_endpoint = match settings.aad_endpoint {
        Some(url) => url,
        None => Url::parse(DEFAULT_AAD_ENDPOINT)
            .map_err(|e| Error::Config(format!("Invalid AAD endpoint: {e}")))?,
    };
    let arm_endpoint = match settings.arm_endpoint {
        Some(url) => url,
        None => Url::parse(DEFAULT_ARM_ENDPOINT)
            .map_err(|e| Error::Config(format!("Invalid ARM endpoint: {e}")))?,
    };

    Ok(AzureConfig {
        tenant_id: settings.tenant_id,
        client_id: settings.client_id,
        client_secret: settings.client_secret,
        aad_endpoint,
        arm_endpoint,
        cluster_type: settings.cluster_type,
        resource_id: settings.resource_id,
        token_strategy: settings.token_strategy,
        aks_token_url: settings.aks_token_url,
        arm_call_limit: settings.arm_call_limit,
        timeout: settings.timeout,
        skip_authz_check: settings.skip_authz_check,
        retrieve_group_memberships: settings.retrieve_group_memberships,
        skip_authz_for_non_aad_users: settings.skip_authz_for_non_aad_users,
        verify_clientid_in_audience: settings.verify_clientid_in_audience,
        issuer: settings.issuer,
    })
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
