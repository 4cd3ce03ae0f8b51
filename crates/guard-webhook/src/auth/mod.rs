//! Bearer token authentication
//!
//! Validates Azure AD issued JWTs for the `/tokenreviews` endpoint.
//!
//! # Features
//!
//! - JWT validation with RS256/RS384/RS512/ES256/ES384 via `jsonwebtoken`
//! - OIDC discovery of the tenant's JWKS URI via `openidconnect`
//! - JWKS fetching with background refresh and re-fetch on unknown `kid`
//! - v1 (`sts.windows.net`) and v2 (`login.microsoftonline.com`) issuers

mod azure;
mod claims;
mod config;
mod error;
mod jwks;
mod jwt;
mod oidc;

pub use azure::AzureAuthenticator;
pub use claims::{AzureClaims, OneOrMany};
pub use config::{AzureAuthConfig, JwtConfig};
pub use error::{AuthError, Result};
pub use jwks::{Jwk, JwkSet, JwksCache, JwksRefreshTask};
pub use jwt::JwtValidator;
pub use oidc::discover_jwks_uri;
