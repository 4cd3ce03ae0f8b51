//! TOML configuration file loading

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::azure::TokenStrategy;
use super::builder::ConfigBuilder;
use crate::Result;
use crate::authz::ClusterType;

/// Configuration file locations checked in order
const CONFIG_PATHS: &[&str] = &[
    "./guard.toml",
    "~/.config/guard/config.toml",
    "/etc/guard/config.toml",
];

/// Find the first existing configuration file
pub fn find_config_file() -> Option<PathBuf> {
    for path_str in CONFIG_PATHS {
        let path = if path_str.starts_with('~') {
            if let Ok(home) = std::env::var("HOME") {
                PathBuf::from(path_str.replacen('~', &home, 1))
            } else {
                continue;
            }
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from a TOML file
pub fn load_from_file(path: &Path, mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let file_config: FileConfig = toml::from_str(&content).map_err(|e| {
        crate::Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })?;

    builder = apply_file_config(builder, file_config)?;
    Ok(builder)
}

fn parse_url(value: &str, what: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| crate::Error::Config(format!("Invalid {what}: {e}")))
}

fn apply_file_config(mut builder: ConfigBuilder, config: FileConfig) -> Result<ConfigBuilder> {
    if let Some(server) = config.server {
        if let Some(addr) = server.listen_addr {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid listen address: {e}")))?;
            builder = builder.listen_addr(addr);
        }
        if let Some(path) = server.cert_file {
            builder = builder.cert_file(path);
        }
        if let Some(path) = server.key_file {
            builder = builder.key_file(path);
        }
        if let Some(path) = server.client_ca_file {
            builder = builder.client_ca_file(path);
        }
        if let Some(secs) = server.read_timeout_secs {
            builder = builder.read_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = server.write_timeout_secs {
            builder = builder.write_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = server.handshake_timeout_secs {
            builder = builder.handshake_timeout(Duration::from_secs(secs));
        }
    }

    if let Some(providers) = config.providers {
        builder = builder.providers(providers);
    }

    if let Some(azure) = config.azure {
        builder = apply_azure(builder, azure)?;
    }

    if let Some(cache) = config.cache {
        if let Some(shards) = cache.shards {
            builder = builder.cache_shards(shards);
        }
        if let Some(max) = cache.max_entries {
            builder = builder.cache_max_entries(max);
        }
        if let Some(max) = cache.max_entry_size {
            builder = builder.cache_max_entry_size(max);
        }
        if let Some(secs) = cache.life_window_secs {
            builder = builder.cache_life_window(Duration::from_secs(secs));
        }
        if let Some(secs) = cache.clean_window_secs {
            builder = builder.cache_clean_window(Duration::from_secs(secs));
        }
    }

    if let Some(obs) = config.observability {
        if let Some(endpoint) = obs.otlp_endpoint {
            builder = builder.otlp_endpoint(Some(endpoint));
        }
        if let Some(name) = obs.service_name {
            builder = builder.service_name(name);
        }
        if let Some(level) = obs.log_level {
            builder = builder.log_level(level);
        }
        if let Some(json) = obs.json_logs {
            builder = builder.json_logs(json);
        }
    }

    Ok(builder)
}

fn apply_azure(mut builder: ConfigBuilder, azure: AzureFileConfig) -> Result<ConfigBuilder> {
    if let Some(tenant_id) = azure.tenant_id {
        builder = builder.azure_tenant_id(tenant_id);
    }
    if let Some(client_id) = azure.client_id {
        builder = builder.azure_client_id(client_id);
    }
    if let Some(secret) = azure.client_secret {
        builder = builder.azure_client_secret(secret);
    }
    if let Some(endpoint) = azure.aad_endpoint {
        builder = builder.azure_aad_endpoint(parse_url(&endpoint, "AAD endpoint")?);
    }
    if let Some(endpoint) = azure.arm_endpoint {
        builder = builder.azure_arm_endpoint(parse_url(&endpoint, "ARM endpoint")?);
    }
    if let Some(mode) = azure.authz_mode {
        builder = builder.azure_cluster_type(mode.parse::<ClusterType>()?);
    }
    if let Some(resource_id) = azure.resource_id {
        builder = builder.azure_resource_id(resource_id);
    }
    if let Some(strategy) = azure.token_strategy {
        builder = builder.azure_token_strategy(strategy.parse::<TokenStrategy>()?);
    }
    if let Some(url) = azure.aks_token_url {
        builder = builder.azure_aks_token_url(parse_url(&url, "AKS token URL")?);
    }
    if let Some(limit) = azure.arm_call_limit {
        builder = builder.azure_arm_call_limit(limit);
    }
    if let Some(secs) = azure.timeout_secs {
        builder = builder.azure_timeout(Duration::from_secs(secs));
    }
    if let Some(usernames) = azure.skip_authz_check {
        builder = builder.azure_skip_authz_check(usernames);
    }
    if let Some(enabled) = azure.retrieve_group_memberships {
        builder = builder.azure_retrieve_group_memberships(enabled);
    }
    if let Some(enabled) = azure.skip_authz_for_non_aad_users {
        builder = builder.azure_skip_authz_for_non_aad_users(enabled);
    }
    if let Some(enabled) = azure.verify_clientid_in_audience {
        builder = builder.azure_verify_clientid_in_audience(enabled);
    }
    if let Some(issuer) = azure.issuer {
        builder = builder.azure_issuer(issuer);
    }
    Ok(builder)
}

/// Root configuration file structure
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    server: Option<ServerFileConfig>,
    providers: Option<Vec<String>>,
    azure: Option<AzureFileConfig>,
    cache: Option<CacheFileConfig>,
    observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Deserialize)]
struct ServerFileConfig {
    listen_addr: Option<String>,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    client_ca_file: Option<PathBuf>,
    read_timeout_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
    handshake_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AzureFileConfig {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    aad_endpoint: Option<String>,
    arm_endpoint: Option<String>,
    authz_mode: Option<String>,
    resource_id: Option<String>,
    token_strategy: Option<String>,
    aks_token_url: Option<String>,
    arm_call_limit: Option<i64>,
    timeout_secs: Option<u64>,
    skip_authz_check: Option<Vec<String>>,
    retrieve_group_memberships: Option<bool>,
    skip_authz_for_non_aad_users: Option<bool>,
    verify_clientid_in_audience: Option<bool>,
    issuer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CacheFileConfig {
    shards: Option<usize>,
    max_entries: Option<usize>,
    max_entry_size: Option<usize>,
    life_window_secs: Option<u64>,
    clean_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    otlp_endpoint: Option<String>,
    service_name: Option<String>,
    log_level: Option<String>,
    json_logs: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const TLS: &str = r#"
[server]
cert_file = "/etc/guard/pki/server.crt"
key_file = "/etc/guard/pki/server.key"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
providers = ["azure"]

[server]
listen_addr = "0.0.0.0:9443"
cert_file = "/etc/guard/pki/server.crt"
key_file = "/etc/guard/pki/server.key"
client_ca_file = "/etc/guard/pki/ca.crt"
read_timeout_secs = 3
write_timeout_secs = 7

[azure]
tenant_id = "tenant"
client_id = "client"
client_secret = "secret"
authz_mode = "arc"
resource_id = "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Kubernetes/connectedClusters/c1"
skip_authz_check = ["kube-proxy"]
arm_call_limit = 100

[cache]
shards = 64
life_window_secs = 120

[observability]
otlp_endpoint = "http://localhost:4317"
service_name = "guard"
log_level = "debug"
json_logs = true
"#;

        let config: FileConfig = toml::from_str(toml_content).unwrap();

        assert_eq!(config.providers, Some(vec!["azure".to_string()]));
        let server = config.server.unwrap();
        assert_eq!(server.listen_addr.as_deref(), Some("0.0.0.0:9443"));
        assert_eq!(server.read_timeout_secs, Some(3));

        let azure = config.azure.unwrap();
        assert_eq!(azure.authz_mode.as_deref(), Some("arc"));
        assert_eq!(azure.arm_call_limit, Some(100));

        let cache = config.cache.unwrap();
        assert_eq!(cache.shards, Some(64));
        assert!(cache.max_entries.is_none());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: FileConfig = toml::from_str(TLS).unwrap();
        assert!(config.server.is_some());
        assert!(config.azure.is_none());
        assert!(config.cache.is_none());
        assert!(config.providers.is_none());
    }

    #[test]
    fn test_load_from_file_success() {
        let toml_content = format!(
            r#"
providers = ["azure"]
{TLS}
read_timeout_secs = 2

[azure]
tenant_id = "tenant"
client_id = "client"
client_secret = "secret"
authz_mode = "arc"
resource_id = "/subscriptions/sub"
skip_authz_for_non_aad_users = false

[cache]
shards = 16
clean_window_secs = 30
"#
        );
        let temp_file = create_temp_config(&toml_content);

        let builder = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap();
        let config = builder.build().unwrap();

        assert_eq!(config.server.read_timeout, Duration::from_secs(2));
        assert_eq!(config.cache.shards, 16);
        assert_eq!(config.cache.clean_window, Duration::from_secs(30));

        let azure = config.azure.unwrap();
        assert_eq!(azure.cluster_type, ClusterType::Arc);
        assert!(!azure.skip_authz_for_non_aad_users);
        assert!(azure.retrieve_group_memberships);
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(
            Path::new("/nonexistent/path/config.toml"),
            ConfigBuilder::new(),
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_from_file_invalid_toml() {
        let temp_file = create_temp_config("this is not valid toml {{{{");

        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_from_file_invalid_endpoint() {
        let temp_file = create_temp_config(
            r#"
[azure]
arm_endpoint = "not a valid url"
"#,
        );

        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Invalid ARM endpoint"));
    }

    #[test]
    fn test_load_invalid_authz_mode() {
        let temp_file = create_temp_config(
            r#"
[azure]
authz_mode = "eks"
"#,
        );

        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("eks"));
    }

    #[test]
    fn test_load_invalid_listen_addr() {
        let temp_file = create_temp_config(
            r#"
[server]
listen_addr = "localhost"
"#,
        );

        let err = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_load_observability_config() {
        let toml_content = format!(
            r#"
{TLS}
[observability]
otlp_endpoint = "http://jaeger:4317"
service_name = "my-guard"
log_level = "trace"
json_logs = true
"#
        );
        let temp_file = create_temp_config(&toml_content);

        let config = load_from_file(temp_file.path(), ConfigBuilder::new())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            config.telemetry.otlp_endpoint,
            Some("http://jaeger:4317".to_string())
        );
        assert_eq!(config.telemetry.service_name, "my-guard");
        assert_eq!(config.telemetry.log_level, "trace");
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_empty_config_file() {
        let temp_file = create_temp_config("");

        let builder = load_from_file(temp_file.path(), ConfigBuilder::new()).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_find_config_file_not_found() {
        let result = find_config_file();
        assert!(result.is_none() || result.unwrap().exists());
    }
}
