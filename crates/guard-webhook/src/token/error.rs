//! Token acquisition error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("token request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("token request to {endpoint} failed with status code: {status} and response: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode token response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Invalid token provider configuration: {0}")]
    Config(String),
}

impl TokenError {
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TokenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = TokenError::Status {
            endpoint: "https://broker/token".to_string(),
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("forbidden"));
    }

    #[test]
    fn test_decode_error_has_no_status() {
        let err = TokenError::Decode {
            endpoint: "https://broker/token".to_string(),
            message: "missing field `access_token`".to_string(),
        };
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("access_token"));
    }
}
