//! Check-access request shaping and response interpretation
//!
//! Everything here is a pure function of the access request so cache keys,
//! action ids and scopes are reproducible across replicas.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    ACCESS_ALLOWED_DECISION, ACCESS_ALLOWED_VERDICT, ACCESS_NOT_ALLOWED_VERDICT,
    OID_INVALID_MESSAGE, OID_MISSING_MESSAGE, OID_CLAIM,
};
use crate::types::{AccessDecision, AccessRequest, RequestAttributes, ResourceAttributes};
use crate::{Error, Result};

const NAMESPACES: &str = "namespaces";

/// Join slash-separated segments, skipping empty ones, and clean the result.
///
/// Cleaning collapses repeated slashes, resolves `.` and `..`, and drops a
/// trailing slash. A leading slash on the first segment is kept.
pub fn join_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let joined = segments
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        return joined;
    }
    clean_path(&joined)
}

fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let body = parts.join("/");
    if rooted {
        format!("/{body}")
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

/// Map a Kubernetes verb to its ARM data action suffix, empty for unknown verbs
pub fn action_name(verb: &str) -> &'static str {
    match verb {
        "get" | "list" | "watch" => "read",
        "create" | "patch" | "update" => "write",
        "delete" | "deletecollection" => "delete",
        "bind" => "bind/action",
        "escalate" => "escalate/action",
        "use" => "use/action",
        "impersonate" => "impersonate/action",
        _ => "",
    }
}

/// ARM resource id for the request, scoped to its namespace when it has one
pub fn scope(resource_id: &str, attributes: Option<&ResourceAttributes>) -> String {
    match attributes {
        Some(attrs) if !attrs.namespace.is_empty() => {
            join_path([resource_id, NAMESPACES, attrs.namespace.as_str()])
        }
        _ => resource_id.to_string(),
    }
}

/// `namespaces/{ns}` suffix for the check-access URL, if the request is namespaced
pub fn namespace_scope(request: &AccessRequest) -> Option<String> {
    request
        .namespace()
        .map(|namespace| join_path([NAMESPACES, namespace]))
}

/// Keep only group ids that parse as UUIDs, preserving order
pub fn valid_security_groups(groups: &[String]) -> Vec<String> {
    groups
        .iter()
        .filter(|group| is_valid_uuid(group))
        .cloned()
        .collect()
}

fn is_valid_uuid(value: &str) -> bool {
    Uuid::parse_str(value).is_ok()
}

/// Data action id, e.g. `Microsoft.Kubernetes/connectedClusters/apps/deployments/write`
pub fn data_action_id(cluster_type: &str, request: &AccessRequest) -> String {
    match &request.attributes {
        RequestAttributes::Resource(attrs) => join_path([
            cluster_type,
            attrs.group.as_str(),
            attrs.resource.as_str(),
            action_name(&attrs.verb),
        ]),
        RequestAttributes::NonResource(attrs) => join_path([
            cluster_type,
            attrs.path.as_str(),
            action_name(&attrs.verb),
        ]),
    }
}

/// Decision cache key: user, namespace, group, resource and mapped action.
///
/// Verbs that map to the same action share a key.
pub fn result_cache_key(request: &AccessRequest) -> String {
    match &request.attributes {
        RequestAttributes::Resource(attrs) => join_path([
            request.user.as_str(),
            attrs.namespace.as_str(),
            attrs.group.as_str(),
            attrs.resource.as_str(),
            action_name(&attrs.verb),
        ]),
        RequestAttributes::NonResource(attrs) => join_path([
            request.user.as_str(),
            attrs.path.as_str(),
            action_name(&attrs.verb),
        ]),
    }
}

/// Object id from the `oid` extra claim; exactly one well-formed UUID
pub fn subject_object_id(request: &AccessRequest) -> Result<&str> {
    let values = request
        .extra
        .get(OID_CLAIM)
        .ok_or_else(|| Error::invalid_credential(OID_MISSING_MESSAGE))?;

    match values.as_slice() {
        [oid] if is_valid_uuid(oid) => Ok(oid),
        _ => Err(Error::invalid_credential(OID_INVALID_MESSAGE)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectAttributes {
    #[serde(rename = "ObjectId")]
    pub object_id: String,
    #[serde(rename = "Groups", skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(rename = "xms-pasrp-retrievegroupmemberships")]
    pub retrieve_group_memberships: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectInfo {
    #[serde(rename = "Attributes")]
    pub attributes: SubjectAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationEntity {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationActionInfo {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "IsDataAction")]
    pub is_data_action: bool,
}

/// Body posted to the check-access endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckAccessRequest {
    #[serde(rename = "Subject")]
    pub subject: SubjectInfo,
    #[serde(rename = "Actions")]
    pub actions: Vec<AuthorizationActionInfo>,
    #[serde(rename = "Resource")]
    pub resource: AuthorizationEntity,
}

/// Build the check-access body.
///
/// When `retrieve_group_memberships` is set ARM resolves groups itself and
/// the caller's claimed groups are not sent.
pub fn prepare_check_access_body(
    request: &AccessRequest,
    cluster_type: &str,
    resource_id: &str,
    retrieve_group_memberships: bool,
) -> Result<CheckAccessRequest> {
    let object_id = subject_object_id(request)?.to_string();

    let groups = if retrieve_group_memberships {
        Vec::new()
    } else {
        valid_security_groups(&request.groups)
    };

    let resource_attributes = match &request.attributes {
        RequestAttributes::Resource(attrs) => Some(attrs),
        RequestAttributes::NonResource(_) => None,
    };

    Ok(CheckAccessRequest {
        subject: SubjectInfo {
            attributes: SubjectAttributes {
                object_id,
                groups,
                retrieve_group_memberships,
            },
        },
        actions: vec![AuthorizationActionInfo {
            id: data_action_id(cluster_type, request),
            is_data_action: true,
        }],
        resource: AuthorizationEntity {
            id: scope(resource_id, resource_attributes),
        },
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleAssignment {
    pub id: String,
    pub role_definition_id: String,
    pub principal_id: String,
    pub principal_type: String,
    pub scope: String,
    pub condition: String,
    pub condition_version: String,
    pub can_delegate: bool,
    pub delegated_managed_identity_resource_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DenyAssignment {
    pub id: String,
    pub name: String,
    pub description: String,
    pub scope: String,
    pub do_not_apply_to_child_scopes: bool,
    pub condition: String,
    pub condition_version: String,
    pub is_built_in: bool,
}

/// One per-action verdict in the check-access response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationDecision {
    #[serde(rename = "accessDecision", default)]
    pub decision: String,
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub is_data_action: bool,
    #[serde(default)]
    pub role_assignment: Option<RoleAssignment>,
    #[serde(default)]
    pub deny_assignment: Option<DenyAssignment>,
    #[serde(default)]
    pub time_to_live_in_ms: u64,
}

/// Interpret a check-access response body.
///
/// Only the first decision counts; it allows when its disposition equals
/// `allowed` ignoring case and denies otherwise.
pub fn convert_check_access_response(body: &[u8]) -> std::result::Result<AccessDecision, String> {
    let decisions: Vec<AuthorizationDecision> =
        serde_json::from_slice(body).map_err(|e| format!("invalid check access response: {e}"))?;

    let first = decisions
        .first()
        .ok_or_else(|| "check access response contains no decisions".to_string())?;

    if let Some(assignment) = &first.role_assignment {
        tracing::trace!(
            action_id = %first.action_id,
            role_assignment = %assignment.id,
            "Matched role assignment"
        );
    }

    let decision = if first.decision.eq_ignore_ascii_case(ACCESS_ALLOWED_DECISION) {
        AccessDecision::allow(ACCESS_ALLOWED_VERDICT)
    } else {
        AccessDecision::deny(ACCESS_NOT_ALLOWED_VERDICT)
    };

    if first.time_to_live_in_ms > 0 {
        return Ok(decision.with_ttl(Duration::from_millis(first.time_to_live_in_ms)));
    }
    Ok(decision)
}
