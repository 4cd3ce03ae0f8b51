//! Environment variable loading for configuration

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use super::azure::TokenStrategy;
use super::builder::ConfigBuilder;
use crate::Result;
use crate::authz::ClusterType;

/// Environment variable names
mod vars {
    pub const LISTEN_ADDR: &str = "GUARD_LISTEN_ADDR";
    pub const TLS_CERT_FILE: &str = "GUARD_TLS_CERT_FILE";
    pub const TLS_KEY_FILE: &str = "GUARD_TLS_KEY_FILE";
    pub const TLS_CA_FILE: &str = "GUARD_TLS_CA_FILE";
    pub const READ_TIMEOUT_SECS: &str = "GUARD_READ_TIMEOUT_SECS";
    pub const WRITE_TIMEOUT_SECS: &str = "GUARD_WRITE_TIMEOUT_SECS";
    pub const HANDSHAKE_TIMEOUT_SECS: &str = "GUARD_HANDSHAKE_TIMEOUT_SECS";
    pub const PROVIDERS: &str = "GUARD_PROVIDERS";
    pub const AZURE_TENANT_ID: &str = "GUARD_AZURE_TENANT_ID";
    pub const AZURE_CLIENT_ID: &str = "GUARD_AZURE_CLIENT_ID";
    pub const AZURE_CLIENT_SECRET: &str = "GUARD_AZURE_CLIENT_SECRET";
    pub const AZURE_AAD_ENDPOINT: &str = "GUARD_AZURE_AAD_ENDPOINT";
    pub const AZURE_ARM_ENDPOINT: &str = "GUARD_AZURE_ARM_ENDPOINT";
    pub const AZURE_AUTHZ_MODE: &str = "GUARD_AZURE_AUTHZ_MODE";
    pub const AZURE_RESOURCE_ID: &str = "GUARD_AZURE_RESOURCE_ID";
    pub const AZURE_TOKEN_STRATEGY: &str = "GUARD_AZURE_TOKEN_STRATEGY";
    pub const AZURE_AKS_TOKEN_URL: &str = "GUARD_AZURE_AKS_TOKEN_URL";
    pub const AZURE_ARM_CALL_LIMIT: &str = "GUARD_AZURE_ARM_CALL_LIMIT";
    pub const AZURE_TIMEOUT_SECS: &str = "GUARD_AZURE_TIMEOUT_SECS";
    pub const AZURE_SKIP_AUTHZ_CHECK: &str = "GUARD_AZURE_SKIP_AUTHZ_CHECK";
    pub const AZURE_RETRIEVE_GROUP_MEMBERSHIPS: &str = "GUARD_AZURE_RETRIEVE_GROUP_MEMBERSHIPS";
    pub const AZURE_SKIP_AUTHZ_FOR_NON_AAD_USERS: &str =
        "GUARD_AZURE_SKIP_AUTHZ_FOR_NON_AAD_USERS";
    pub const AZURE_VERIFY_CLIENTID: &str = "GUARD_AZURE_VERIFY_CLIENTID";
    pub const AZURE_ISSUER: &str = "GUARD_AZURE_ISSUER";
    pub const CACHE_SHARDS: &str = "GUARD_CACHE_SHARDS";
    pub const CACHE_MAX_ENTRIES: &str = "GUARD_CACHE_MAX_ENTRIES";
    pub const CACHE_MAX_ENTRY_SIZE: &str = "GUARD_CACHE_MAX_ENTRY_SIZE";
    pub const CACHE_LIFE_WINDOW_SECS: &str = "GUARD_CACHE_LIFE_WINDOW_SECS";
    pub const CACHE_CLEAN_WINDOW_SECS: &str = "GUARD_CACHE_CLEAN_WINDOW_SECS";
    pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
    pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
    pub const LOG_LEVEL: &str = "GUARD_LOG_LEVEL";
    pub const JSON_LOGS: &str = "GUARD_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    // Server
    if let Ok(addr) = env::var(vars::LISTEN_ADDR) {
        let addr: SocketAddr = addr.parse().map_err(|e| {
            crate::Error::Config(format!("Invalid {}: {}", vars::LISTEN_ADDR, e))
        })?;
        builder = builder.listen_addr(addr);
    }

    if let Ok(path) = env::var(vars::TLS_CERT_FILE) {
        builder = builder.cert_file(PathBuf::from(path));
    }

    if let Ok(path) = env::var(vars::TLS_KEY_FILE) {
        builder = builder.key_file(PathBuf::from(path));
    }

    if let Ok(path) = env::var(vars::TLS_CA_FILE) {
        builder = builder.client_ca_file(PathBuf::from(path));
    }

    if let Some(timeout) = parse_secs(vars::READ_TIMEOUT_SECS) {
        builder = builder.read_timeout(timeout);
    }

    if let Some(timeout) = parse_secs(vars::WRITE_TIMEOUT_SECS) {
        builder = builder.write_timeout(timeout);
    }

    if let Some(timeout) = parse_secs(vars::HANDSHAKE_TIMEOUT_SECS) {
        builder = builder.handshake_timeout(timeout);
    }

    // Providers
    if let Ok(providers) = env::var(vars::PROVIDERS) {
        builder = builder.providers(parse_list(&providers));
    }

    // Azure
    if let Ok(tenant_id) = env::var(vars::AZURE_TENANT_ID) {
        builder = builder.azure_tenant_id(tenant_id);
    }

    if let Ok(client_id) = env::var(vars::AZURE_CLIENT_ID) {
        builder = builder.azure_client_id(client_id);
    }

    if let Ok(secret) = env::var(vars::AZURE_CLIENT_SECRET) {
        builder = builder.azure_client_secret(secret);
    }

    if let Ok(endpoint) = env::var(vars::AZURE_AAD_ENDPOINT) {
        builder = builder.azure_aad_endpoint(parse_url(vars::AZURE_AAD_ENDPOINT, &endpoint)?);
    }

    if let Ok(endpoint) = env::var(vars::AZURE_ARM_ENDPOINT) {
        builder = builder.azure_arm_endpoint(parse_url(vars::AZURE_ARM_ENDPOINT, &endpoint)?);
    }

    if let Ok(mode) = env::var(vars::AZURE_AUTHZ_MODE) {
        builder = builder.azure_cluster_type(mode.parse::<ClusterType>()?);
    }

    if let Ok(resource_id) = env::var(vars::AZURE_RESOURCE_ID) {
        builder = builder.azure_resource_id(resource_id);
    }

    if let Ok(strategy) = env::var(vars::AZURE_TOKEN_STRATEGY) {
        builder = builder.azure_token_strategy(strategy.parse::<TokenStrategy>()?);
    }

    if let Ok(url) = env::var(vars::AZURE_AKS_TOKEN_URL) {
        builder = builder.azure_aks_token_url(parse_url(vars::AZURE_AKS_TOKEN_URL, &url)?);
    }

    if let Ok(limit_str) = env::var(vars::AZURE_ARM_CALL_LIMIT)
        && let Ok(limit) = limit_str.parse::<i64>()
    {
        builder = builder.azure_arm_call_limit(limit);
    }

    if let Some(timeout) = parse_secs(vars::AZURE_TIMEOUT_SECS) {
        builder = builder.azure_timeout(timeout);
    }

    if let Ok(usernames) = env::var(vars::AZURE_SKIP_AUTHZ_CHECK) {
        builder = builder.azure_skip_authz_check(parse_list(&usernames));
    }

    if let Ok(val) = env::var(vars::AZURE_RETRIEVE_GROUP_MEMBERSHIPS) {
        builder = builder.azure_retrieve_group_memberships(parse_bool(&val));
    }

    if let Ok(val) = env::var(vars::AZURE_SKIP_AUTHZ_FOR_NON_AAD_USERS) {
        builder = builder.azure_skip_authz_for_non_aad_users(parse_bool(&val));
    }

    if let Ok(val) = env::var(vars::AZURE_VERIFY_CLIENTID) {
        builder = builder.azure_verify_clientid_in_audience(parse_bool(&val));
    }

    if let Ok(issuer) = env::var(vars::AZURE_ISSUER) {
        builder = builder.azure_issuer(issuer);
    }

    // Cache
    if let Some(shards) = parse_usize(vars::CACHE_SHARDS) {
        builder = builder.cache_shards(shards);
    }

    if let Some(max) = parse_usize(vars::CACHE_MAX_ENTRIES) {
        builder = builder.cache_max_entries(max);
    }

    if let Some(max) = parse_usize(vars::CACHE_MAX_ENTRY_SIZE) {
        builder = builder.cache_max_entry_size(max);
    }

    if let Some(window) = parse_secs(vars::CACHE_LIFE_WINDOW_SECS) {
        builder = builder.cache_life_window(window);
    }

    if let Some(window) = parse_secs(vars::CACHE_CLEAN_WINDOW_SECS) {
        builder = builder.cache_clean_window(window);
    }

    // Telemetry
    if let Ok(endpoint) = env::var(vars::OTEL_EXPORTER_OTLP_ENDPOINT) {
        builder = builder.otlp_endpoint(Some(endpoint));
    }

    if let Ok(name) = env::var(vars::OTEL_SERVICE_NAME) {
        builder = builder.service_name(name);
    }

    if let Ok(level) = env::var(vars::LOG_LEVEL) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_url(var: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| crate::Error::Config(format!("Invalid {var}: {e}")))
}

fn parse_secs(var: &str) -> Option<Duration> {
    env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn parse_usize(var: &str) -> Option<usize> {
    env::var(var).ok().and_then(|s| s.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_MUTEX;

    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX.lock().unwrap();

        let old_values: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        for (key, value) in vars {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::set_var(key, value) };
        }

        let result = f();

        for (key, old_value) in old_values {
            match old_value {
                // SAFETY: We hold a mutex lock to ensure no concurrent modifications
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    fn tls() -> ConfigBuilder {
        ConfigBuilder::new()
            .cert_file(PathBuf::from("server.crt"))
            .key_file(PathBuf::from("server.key"))
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" kube-proxy, ,system:node "),
            vec!["kube-proxy", "system:node"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_load_server_from_env() {
        with_env_vars(
            &[
                (vars::LISTEN_ADDR, "127.0.0.1:9443"),
                (vars::TLS_CERT_FILE, "/pki/tls.crt"),
                (vars::TLS_KEY_FILE, "/pki/tls.key"),
                (vars::TLS_CA_FILE, "/pki/ca.crt"),
                (vars::READ_TIMEOUT_SECS, "2"),
            ],
            || {
                let config = load_from_env(ConfigBuilder::new())
                    .unwrap()
                    .build()
                    .unwrap();
                assert_eq!(config.server.listen_addr.port(), 9443);
                assert_eq!(config.server.cert_file, PathBuf::from("/pki/tls.crt"));
                assert_eq!(
                    config.server.client_ca_file,
                    Some(PathBuf::from("/pki/ca.crt"))
                );
                assert_eq!(config.server.read_timeout, Duration::from_secs(2));
            },
        );
    }

    #[test]
    fn test_load_azure_from_env() {
        with_env_vars(
            &[
                (vars::PROVIDERS, "azure"),
                (vars::AZURE_TENANT_ID, "tenant"),
                (vars::AZURE_TOKEN_STRATEGY, "aks"),
                (vars::AZURE_AKS_TOKEN_URL, "http://127.0.0.1:8081/authz/token"),
                (vars::AZURE_AUTHZ_MODE, "arc"),
                (vars::AZURE_RESOURCE_ID, "/subscriptions/sub"),
                (vars::AZURE_SKIP_AUTHZ_CHECK, "kube-proxy,system:node"),
                (vars::AZURE_RETRIEVE_GROUP_MEMBERSHIPS, "false"),
                (vars::AZURE_ARM_CALL_LIMIT, "50"),
            ],
            || {
                let config = load_from_env(tls()).unwrap().build().unwrap();
                let azure = config.azure.unwrap();
                assert_eq!(azure.token_strategy, TokenStrategy::Aks);
                assert_eq!(azure.cluster_type, ClusterType::Arc);
                assert_eq!(azure.skip_authz_check, vec!["kube-proxy", "system:node"]);
                assert!(!azure.retrieve_group_memberships);
                assert_eq!(azure.arm_call_limit, 50);
            },
        );
    }

    #[test]
    fn test_invalid_endpoint_env() {
        with_env_vars(&[(vars::AZURE_ARM_ENDPOINT, "not a url")], || {
            let err = load_from_env(ConfigBuilder::new()).unwrap_err();
            assert!(err.to_string().contains(vars::AZURE_ARM_ENDPOINT));
        });
    }

    #[test]
    fn test_invalid_numbers_ignored() {
        with_env_vars(
            &[
                (vars::CACHE_SHARDS, "many"),
                (vars::READ_TIMEOUT_SECS, "-1"),
            ],
            || {
                let config = load_from_env(tls()).unwrap().build().unwrap();
                assert_eq!(config.cache.shards, 128);
                assert_eq!(config.server.read_timeout, Duration::from_secs(5));
            },
        );
    }

    #[test]
    fn test_load_cache_and_telemetry_from_env() {
        with_env_vars(
            &[
                (vars::CACHE_SHARDS, "32"),
                (vars::CACHE_LIFE_WINDOW_SECS, "60"),
                (vars::LOG_LEVEL, "debug"),
                (vars::JSON_LOGS, "1"),
                (vars::OTEL_SERVICE_NAME, "guard-test"),
            ],
            || {
                let config = load_from_env(tls()).unwrap().build().unwrap();
                assert_eq!(config.cache.shards, 32);
                assert_eq!(config.cache.life_window, Duration::from_secs(60));
                assert_eq!(config.telemetry.log_level, "debug");
                assert!(config.telemetry.json_logs);
                assert_eq!(config.telemetry.service_name, "guard-test");
            },
        );
    }
}
