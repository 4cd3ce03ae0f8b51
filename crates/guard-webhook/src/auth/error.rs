//! Authentication error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token is missing")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid issuer")]
    InvalidIssuer,

    #[error("invalid audience")]
    InvalidAudience,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("no matching key for algorithm")]
    NoMatchingKey,

    #[error("unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(jsonwebtoken::Algorithm),

    #[error("claim {0} is missing")]
    MissingClaim(&'static str),

    #[error("OIDC discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("JWKS fetch failed: {0}")]
    JwksFetch(#[from] reqwest::Error),

    #[error("JWKS parse failed: {0}")]
    JwksParse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Failures caused by the presented token rather than by key retrieval
    #[must_use]
    pub const fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingToken
                | Self::InvalidToken
                | Self::TokenExpired
                | Self::InvalidIssuer
                | Self::InvalidAudience
                | Self::InvalidSignature
                | Self::KeyNotFound(_)
                | Self::NoMatchingKey
                | Self::UnsupportedAlgorithm(_)
                | Self::MissingClaim(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidIssuer => Self::InvalidIssuer,
            ErrorKind::InvalidAudience => Self::InvalidAudience,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            _ => Self::InvalidToken,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(AuthError::MissingToken.to_string(), "token is missing");
        assert_eq!(AuthError::InvalidToken.to_string(), "invalid token");
        assert_eq!(AuthError::TokenExpired.to_string(), "token expired");
        assert_eq!(
            AuthError::MissingClaim("oid").to_string(),
            "claim oid is missing"
        );
    }

    #[test]
    fn test_key_not_found_error() {
        let err = AuthError::KeyNotFound("kid123".to_string());
        assert_eq!(err.to_string(), "key not found: kid123");
    }

    #[test]
    fn test_jwks_parse_error() {
        let err = AuthError::JwksParse("invalid JSON".to_string());
        assert_eq!(err.to_string(), "JWKS parse failed: invalid JSON");
    }

    #[test]
    fn test_token_rejection_predicate() {
        assert!(AuthError::TokenExpired.is_token_rejection());
        assert!(AuthError::MissingClaim("oid").is_token_rejection());
        assert!(!AuthError::DiscoveryFailed("timeout".into()).is_token_rejection());
        assert!(!AuthError::Config("bad".into()).is_token_rejection());
    }

    #[test]
    fn test_from_jsonwebtoken_error() {
        use jsonwebtoken::errors::{Error, ErrorKind};

        let err: AuthError = Error::from(ErrorKind::ExpiredSignature).into();
        assert!(matches!(err, AuthError::TokenExpired));

        let err: AuthError = Error::from(ErrorKind::InvalidAudience).into();
        assert!(matches!(err, AuthError::InvalidAudience));

        let err: AuthError = Error::from(ErrorKind::InvalidToken).into();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
