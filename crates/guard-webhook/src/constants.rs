//! Constants for the webhook server and the Azure policy client

/// Organization served by the in-tree Azure provider
pub const ORG_AZURE: &str = "azure";

/// Webhook API versions and kinds
pub const AUTHENTICATION_API_VERSION: &str = "authentication.k8s.io/v1";
pub const AUTHORIZATION_API_VERSION: &str = "authorization.k8s.io/v1";
pub const TOKEN_REVIEW_KIND: &str = "TokenReview";
pub const SUBJECT_ACCESS_REVIEW_KIND: &str = "SubjectAccessReview";

/// Handler labels used for metrics
pub const HANDLER_TOKEN_REVIEWS: &str = "tokenreviews";
pub const HANDLER_SUBJECT_ACCESS_REVIEWS: &str = "subjectaccessreviews";

/// Resource provider namespaces per cluster type
pub const MANAGED_CLUSTERS: &str = "Microsoft.ContainerService/managedClusters";
pub const CONNECTED_CLUSTERS: &str = "Microsoft.Kubernetes/connectedClusters";

/// Check-access endpoint suffix and API version
pub const CHECK_ACCESS_PATH: &str = "/providers/Microsoft.Authorization/checkaccess";
pub const CHECK_ACCESS_API_VERSION: &str = "2018-09-01-preview";

/// Response header carrying remaining ARM read quota
pub const REMAINING_SUBSCRIPTION_READS_HEADER: &str = "x-ms-ratelimit-remaining-subscription-reads";

/// Extra claim carrying the subject object id
pub const OID_CLAIM: &str = "oid";

/// Flag in the check-access subject asking ARM to resolve group memberships
pub const RETRIEVE_GROUP_MEMBERSHIPS_ATTRIBUTE: &str = "xms-pasrp-retrievegroupmemberships";

/// Remote disposition treated as allowed (case-insensitive)
pub const ACCESS_ALLOWED_DECISION: &str = "allowed";

/// Decision reasons
pub const ACCESS_ALLOWED_VERDICT: &str = "Access allowed";
pub const ACCESS_NOT_ALLOWED_VERDICT: &str =
    "User does not have access to the resource in Azure. Update role assignment to allow access.";
pub const NOT_ALLOWED_FOR_NON_AAD_USERS: &str = "Access denied by Azure RBAC for non AAD users. Configure --azure.skip-authz-for-non-aad-users to enable access.";
pub const NO_OPINION_VERDICT: &str = "Azure does not have opinion for this user.";

/// Credential error messages
pub const OID_MISSING_MESSAGE: &str = "oid info not sent from authentication module";
pub const OID_INVALID_MESSAGE: &str = "oid info sent from authentication module is not valid";

/// Time subtracted from a token's real expiry before it is considered expired
pub const TOKEN_EXPIRY_SKEW: std::time::Duration = std::time::Duration::from_secs(60);

/// Default endpoints
pub const DEFAULT_AAD_ENDPOINT: &str = "https://login.microsoftonline.com/";
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com/";

/// Default ARM remaining-read headroom below which connections are rotated
pub const DEFAULT_ARM_CALL_LIMIT: i64 = 2000;

/// Token provider names
pub const CLIENT_CREDENTIAL_PROVIDER_NAME: &str = "ClientCredentialTokenProvider";
pub const AKS_PROVIDER_NAME: &str = "AKSTokenProvider";
