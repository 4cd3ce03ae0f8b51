//! Azure RBAC authorizer
//!
//! Answers SubjectAccessReviews with the ARM check-access API. Callers
//! without an `oid` claim were not authenticated by Azure AD and are either
//! passed on with no opinion or rejected, depending on configuration.

mod checkaccess;
mod rbac;

use async_trait::async_trait;

pub use checkaccess::{
    AuthorizationDecision, CheckAccessRequest, action_name, convert_check_access_response,
    data_action_id, join_path, prepare_check_access_body, result_cache_key, scope,
    valid_security_groups,
};
pub use rbac::{ClusterType, RbacClient, RbacOptions};

use crate::constants::{NO_OPINION_VERDICT, NOT_ALLOWED_FOR_NON_AAD_USERS, OID_CLAIM, ORG_AZURE};
use crate::registry::Authorizer;
use crate::types::{AccessDecision, AccessRequest};
use crate::{Error, Result};

#[derive(Debug)]
pub struct AzureAuthorizer {
    client: RbacClient,
}

impl AzureAuthorizer {
    #[must_use]
    pub const fn new(client: RbacClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub const fn client(&self) -> &RbacClient {
        &self.client
    }
}

#[async_trait]
impl Authorizer for AzureAuthorizer {
    async fn check(&self, request: &AccessRequest) -> Result<AccessDecision> {
        if !request.has_extra(OID_CLAIM) {
            if self.client.should_skip_authz_check_for_non_aad_users() {
                tracing::debug!(user = %request.user, "Skipping authz for non AAD user");
                return Ok(AccessDecision::no_opinion(NO_OPINION_VERDICT));
            }
            return Err(Error::invalid_credential(NOT_ALLOWED_FOR_NON_AAD_USERS));
        }

        if self.client.skip_authz_check(request) {
            tracing::debug!(user = %request.user, "User is on the authz skip list");
            return Ok(AccessDecision::no_opinion(NO_OPINION_VERDICT));
        }

        self.client.check_access(request).await
    }

    fn name(&self) -> &'static str {
        ORG_AZURE
    }
}
