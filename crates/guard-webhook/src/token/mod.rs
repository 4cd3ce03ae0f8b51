//! Bearer tokens for the remote policy API
//!
//! [`TokenCredentialManager`] holds the current token and refreshes it through
//! one of two [`TokenProvider`] strategies:
//!
//! - [`ClientCredentialTokenProvider`] - OAuth2 client-credential exchange
//!   against the tenant's token endpoint
//! - [`AksTokenProvider`] - exchange through the managed platform's broker

mod aks;
mod client_credential;
mod error;
mod manager;
mod provider;

pub use aks::AksTokenProvider;
pub use client_credential::ClientCredentialTokenProvider;
pub use error::{Result, TokenError};
pub use manager::{TokenCredential, TokenCredentialManager};
pub use provider::{TokenProvider, TokenResponse};
