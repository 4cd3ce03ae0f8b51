//! Webhook wire types and the domain types providers work with
//!
//! The review objects mirror the JSON shapes the cluster control plane posts
//! to `/tokenreviews` and `/subjectaccessreviews`. Providers never see them
//! directly; the transport converts them into [`AccessRequest`] and renders
//! [`Identity`] and [`AccessDecision`] back.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    AUTHENTICATION_API_VERSION, AUTHORIZATION_API_VERSION, SUBJECT_ACCESS_REVIEW_KIND,
    TOKEN_REVIEW_KIND,
};
use crate::{Error, Result};

/// Extra user attributes, e.g. `{"oid": ["<uuid>"]}`
pub type Extra = BTreeMap<String, Vec<String>>;

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

/// Authentication webhook payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReview {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub spec: TokenReviewSpec,
    #[serde(default)]
    pub status: TokenReviewStatus,
}

impl TokenReview {
    /// Response carrying only a status; the bearer token is never echoed
    #[must_use]
    pub fn response(status: TokenReviewStatus) -> Self {
        Self {
            api_version: AUTHENTICATION_API_VERSION.to_string(),
            kind: TOKEN_REVIEW_KIND.to_string(),
            spec: TokenReviewSpec::default(),
            status,
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReviewSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

impl std::fmt::Debug for TokenReviewSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenReviewSpec")
            .field("token", &"[REDACTED]")
            .field("audiences", &self.audiences)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReviewStatus {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl TokenReviewStatus {
    #[must_use]
    pub fn authenticated(user: UserInfo) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
            error: String::new(),
        }
    }

    #[must_use]
    pub fn unauthenticated(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            user: None,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

/// Authorization webhook payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReview {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub spec: SubjectAccessReviewSpec,
    #[serde(default)]
    pub status: SubjectAccessReviewStatus,
}

impl SubjectAccessReview {
    /// Response echoing the request spec
    #[must_use]
    pub fn response(spec: SubjectAccessReviewSpec, status: SubjectAccessReviewStatus) -> Self {
        Self {
            api_version: AUTHORIZATION_API_VERSION.to_string(),
            kind: SUBJECT_ACCESS_REVIEW_KIND.to_string(),
            spec,
            status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReviewSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_attributes: Option<ResourceAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_resource_attributes: Option<NonResourceAttributes>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verb: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subresource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonResourceAttributes {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub verb: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAccessReviewStatus {
    #[serde(default)]
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub denied: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub evaluation_error: String,
}

impl From<AccessDecision> for SubjectAccessReviewStatus {
    fn from(decision: AccessDecision) -> Self {
        Self {
            allowed: decision.allowed,
            denied: decision.denied,
            reason: decision.reason,
            evaluation_error: String::new(),
        }
    }
}

/// Authenticated caller produced by an authenticator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub uid: Option<String>,
    pub groups: Vec<String>,
    pub extra: Extra,
}

impl Identity {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.extra.insert(key.into(), values);
        self
    }
}

impl From<Identity> for UserInfo {
    fn from(identity: Identity) -> Self {
        Self {
            username: identity.username,
            uid: identity.uid.unwrap_or_default(),
            groups: identity.groups,
            extra: identity.extra,
        }
    }
}

/// What an access request targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAttributes {
    Resource(ResourceAttributes),
    NonResource(NonResourceAttributes),
}

/// Parsed authorization query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub user: String,
    pub groups: Vec<String>,
    pub extra: Extra,
    pub attributes: RequestAttributes,
}

impl AccessRequest {
    #[must_use]
    pub fn resource(user: impl Into<String>, attributes: ResourceAttributes) -> Self {
        Self {
            user: user.into(),
            groups: Vec::new(),
            extra: Extra::new(),
            attributes: RequestAttributes::Resource(attributes),
        }
    }

    #[must_use]
    pub fn non_resource(user: impl Into<String>, attributes: NonResourceAttributes) -> Self {
        Self {
            user: user.into(),
            groups: Vec::new(),
            extra: Extra::new(),
            attributes: RequestAttributes::NonResource(attributes),
        }
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.extra.insert(key.into(), values);
        self
    }

    #[must_use]
    pub fn verb(&self) -> &str {
        match &self.attributes {
            RequestAttributes::Resource(attrs) => &attrs.verb,
            RequestAttributes::NonResource(attrs) => &attrs.verb,
        }
    }

    /// Namespace of a resource request, `None` when empty or non-resource
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match &self.attributes {
            RequestAttributes::Resource(attrs) if !attrs.namespace.is_empty() => {
                Some(&attrs.namespace)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn has_extra(&self, key: &str) -> bool {
        self.extra.contains_key(key)
    }
}

impl TryFrom<SubjectAccessReviewSpec> for AccessRequest {
    type Error = Error;

    fn try_from(spec: SubjectAccessReviewSpec) -> Result<Self> {
        let attributes = match (spec.resource_attributes, spec.non_resource_attributes) {
            (Some(attrs), _) => RequestAttributes::Resource(attrs),
            (None, Some(attrs)) => RequestAttributes::NonResource(attrs),
            (None, None) => {
                return Err(Error::MalformedRequest(
                    "spec has neither resourceAttributes nor nonResourceAttributes".into(),
                ));
            }
        };

        Ok(Self {
            user: spec.user,
            groups: spec.groups,
            extra: spec.extra,
            attributes,
        })
    }
}

/// Authorizer verdict.
///
/// `allowed` and `denied` are independent: both false means the authorizer
/// has no opinion and the control plane falls through to its next authorizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub denied: bool,
    pub reason: String,
    /// Remote hint for how long the verdict stays valid
    pub ttl: Option<Duration>,
}

impl AccessDecision {
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            denied: false,
            reason: reason.into(),
            ttl: None,
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            denied: true,
            reason: reason.into(),
            ttl: None,
        }
    }

    #[must_use]
    pub fn no_opinion(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            denied: false,
            reason: reason.into(),
            ttl: None,
        }
    }

    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn is_no_opinion(&self) -> bool {
        !self.allowed && !self.denied
    }
}
