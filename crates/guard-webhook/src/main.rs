use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use guard_webhook::auth::AzureAuthenticator;
use guard_webhook::constants::ORG_AZURE;
use guard_webhook::observability::{init_observability, shutdown_observability};
use guard_webhook::transport::run_server;
use guard_webhook::{
    AzureAuthorizer, ClusterType, Config, ConfigBuilder, DecisionStore, ProviderRegistry,
    RbacClient, TokenCredentialManager, TokenStrategy, config, create_decision_store,
};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "guard-webhook")]
#[command(about = "Kubernetes authentication and authorization webhook", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address the webhook listens on
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Server certificate (PEM)
    #[arg(long)]
    tls_cert_file: Option<PathBuf>,

    /// Server private key (PEM)
    #[arg(long)]
    tls_key_file: Option<PathBuf>,

    /// CA bundle used to verify client certificates (PEM)
    #[arg(long)]
    tls_ca_file: Option<PathBuf>,

    /// Enabled providers (comma-separated)
    #[arg(long, value_delimiter = ',')]
    providers: Option<Vec<String>>,

    #[arg(long = "azure.tenant-id")]
    azure_tenant_id: Option<String>,

    #[arg(long = "azure.client-id")]
    azure_client_id: Option<String>,

    #[arg(long = "azure.client-secret")]
    azure_client_secret: Option<String>,

    /// AAD login endpoint
    #[arg(long = "azure.environment-endpoint")]
    azure_aad_endpoint: Option<Url>,

    #[arg(long = "azure.arm-endpoint")]
    azure_arm_endpoint: Option<Url>,

    /// Cluster type used to build RBAC actions (aks or arc)
    #[arg(long = "azure.authz-mode")]
    azure_authz_mode: Option<String>,

    /// ARM resource id of the cluster
    #[arg(long = "azure.resource-id")]
    azure_resource_id: Option<String>,

    /// How ARM tokens are acquired (client-credential or aks)
    #[arg(long = "azure.token-strategy")]
    azure_token_strategy: Option<String>,

    #[arg(long = "azure.aks-authz-token-url")]
    azure_aks_token_url: Option<Url>,

    /// Usernames that bypass the RBAC check (comma-separated)
    #[arg(long = "azure.skip-authz-check", value_delimiter = ',')]
    azure_skip_authz_check: Option<Vec<String>>,

    /// Remaining ARM read quota below which outbound connections are rotated
    #[arg(long = "azure.arm-call-limit")]
    azure_arm_call_limit: Option<i64>,

    /// Send the caller's group memberships for ARM to resolve
    #[arg(long = "azure.retrieve-group-memberships")]
    azure_retrieve_group_memberships: Option<bool>,

    #[arg(long = "azure.skip-authz-for-non-aad-users")]
    azure_skip_authz_for_non_aad_users: Option<bool>,

    #[arg(long = "azure.verify-clientid")]
    azure_verify_clientid: Option<bool>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,
}

impl Args {
    /// Seed the builder with command line values; file and environment are layered on top
    fn seed(&self) -> anyhow::Result<ConfigBuilder> {
        let mut builder = ConfigBuilder::new();

        if let Some(addr) = self.listen_addr {
            builder = builder.listen_addr(addr);
        }
        if let Some(ref path) = self.tls_cert_file {
            builder = builder.cert_file(path.clone());
        }
        if let Some(ref path) = self.tls_key_file {
            builder = builder.key_file(path.clone());
        }
        if let Some(ref path) = self.tls_ca_file {
            builder = builder.client_ca_file(path.clone());
        }
        if let Some(ref providers) = self.providers {
            builder = builder.providers(providers.clone());
        }

        if let Some(ref tenant) = self.azure_tenant_id {
            builder = builder.azure_tenant_id(tenant.clone());
        }
        if let Some(ref client_id) = self.azure_client_id {
            builder = builder.azure_client_id(client_id.clone());
        }
        if let Some(ref secret) = self.azure_client_secret {
            builder = builder.azure_client_secret(secret.clone());
        }
        if let Some(ref endpoint) = self.azure_aad_endpoint {
            builder = builder.azure_aad_endpoint(endpoint.clone());
        }
        if let Some(ref endpoint) = self.azure_arm_endpoint {
            builder = builder.azure_arm_endpoint(endpoint.clone());
        }
        if let Some(ref mode) = self.azure_authz_mode {
            builder = builder.azure_cluster_type(mode.parse::<ClusterType>()?);
        }
        if let Some(ref resource_id) = self.azure_resource_id {
            builder = builder.azure_resource_id(resource_id.clone());
        }
        if let Some(ref strategy) = self.azure_token_strategy {
            builder = builder.azure_token_strategy(strategy.parse::<TokenStrategy>()?);
        }
        if let Some(ref url) = self.azure_aks_token_url {
            builder = builder.azure_aks_token_url(url.clone());
        }
        if let Some(ref users) = self.azure_skip_authz_check {
            builder = builder.azure_skip_authz_check(users.clone());
        }
        if let Some(limit) = self.azure_arm_call_limit {
            builder = builder.azure_arm_call_limit(limit);
        }
        if let Some(retrieve) = self.azure_retrieve_group_memberships {
            builder = builder.azure_retrieve_group_memberships(retrieve);
        }
        if let Some(skip) = self.azure_skip_authz_for_non_aad_users {
            builder = builder.azure_skip_authz_for_non_aad_users(skip);
        }
        if let Some(verify) = self.azure_verify_clientid {
            builder = builder.azure_verify_clientid_in_audience(verify);
        }

        if self.verbose {
            builder = builder.log_level("debug".to_string());
        }
        if self.json_logs {
            builder = builder.json_logs(true);
        }

        Ok(builder)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Precedence: env > file > CLI > defaults
    let builder = args.seed()?;
    let builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path, builder)?
    } else {
        config::load_config(builder)?
    };
    let config = builder.build()?;

    init_observability(&config.telemetry)?;

    tracing::info!("Starting guard webhook");
    tracing::info!("Listen address: {}", config.server.listen_addr);
    tracing::info!("Providers: {:?}", config.providers);
    if let Some(azure) = config.azure() {
        tracing::info!("Azure tenant: {}", azure.tenant_id);
        tracing::info!("Azure cluster type: {}", azure.cluster_type);
        tracing::info!("Azure token strategy: {:?}", azure.token_strategy);
    }

    let shutdown = CancellationToken::new();
    let (registry, store) = build_registry(&config, shutdown.clone()).await?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    let result = run_server(&config.server, Arc::new(registry), shutdown.clone()).await;

    shutdown.cancel();
    if let Some(store) = store {
        store.close();
    }
    shutdown_observability();

    result.map_err(Into::into)
}

/// Register a provider for every enabled organization
async fn build_registry(
    config: &Config,
    shutdown: CancellationToken,
) -> anyhow::Result<(ProviderRegistry, Option<Arc<dyn DecisionStore>>)> {
    let mut registry = ProviderRegistry::new();
    let mut store = None;

    if let Some(azure) = config.azure() {
        let decisions = create_decision_store(*config.cache())?;
        let tokens = Arc::new(TokenCredentialManager::new(
            azure.token_provider()?,
            azure.token_scope(),
        ));
        let client = RbacClient::new(azure.rbac_options(), tokens, Arc::clone(&decisions))?;
        let authenticator = AzureAuthenticator::discover(&azure.auth_config()?, shutdown).await?;

        registry.register(
            ORG_AZURE,
            Some(Arc::new(authenticator)),
            Some(Arc::new(AzureAuthorizer::new(client))),
        );
        store = Some(decisions);
    }

    if registry.is_empty() {
        tracing::warn!("No providers enabled; every review will be rejected");
    }

    Ok((registry, store))
}
