//! Kubernetes authentication and authorization webhook
//!
//! Answers `TokenReview` and `SubjectAccessReview` requests from the API
//! server. The Organization in the caller's client certificate selects a
//! provider from the [`ProviderRegistry`]; the Azure provider validates AAD
//! tokens and checks access against Azure RBAC, caching decisions.

pub mod auth;
pub mod authz;
pub mod cache;
pub mod config;
pub mod constants;
mod error;
mod helpers;
pub mod observability;
pub mod registry;
pub mod token;
pub mod transport;
pub mod types;

pub use authz::{AzureAuthorizer, ClusterType, RbacClient, RbacOptions};
pub use cache::{CacheConfig, CacheStats, DecisionStore, ShardedCache, create_decision_store};
pub use config::{AzureConfig, Config, ConfigBuilder, TelemetryConfig, TokenStrategy};
pub use error::{Error, Result};
pub use registry::{Authenticator, Authorizer, ProviderRegistry};
pub use token::{TokenCredentialManager, TokenProvider};
pub use types::*;
