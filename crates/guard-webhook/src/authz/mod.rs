//! Authorization providers

pub mod azure;

pub use azure::{AzureAuthorizer, ClusterType, RbacClient, RbacOptions};
