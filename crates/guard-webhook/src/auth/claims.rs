//! Azure AD token claims

use serde::Deserialize;

use super::error::{AuthError, Result};
use crate::constants::OID_CLAIM;
use crate::types::Identity;

/// Audience can be a single string or array of strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(s) => s == value,
            Self::Many(v) => v.iter().any(|s| s == value),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Claims read from an Azure AD access token, v1 or v2
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AzureClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: Option<OneOrMany>,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub tid: Option<String>,
    #[serde(default)]
    pub oid: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl AzureClaims {
    /// Username from `upn`, falling back to `unique_name` then `preferred_username`
    pub fn username(&self) -> Option<&str> {
        [&self.upn, &self.unique_name, &self.preferred_username]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|name| !name.is_empty())
    }

    /// Map claims to the identity returned in a TokenReview
    pub fn into_identity(self) -> Result<Identity> {
        let username = self
            .username()
            .ok_or(AuthError::MissingClaim("upn"))?
            .to_string();
        let oid = self
            .oid
            .filter(|oid| !oid.is_empty())
            .ok_or(AuthError::MissingClaim(OID_CLAIM))?;

        Ok(Identity::new(username)
            .with_groups(self.groups)
            .with_extra(OID_CLAIM, vec![oid]))
    }
}
