use axum::http::StatusCode;
use thiserror::Error;

use crate::auth::AuthError;
use crate::token::TokenError;

#[derive(Error, Debug)]
pub enum Error {
    // Client errors, answered with 400
    #[error("Missing client certificate")]
    MissingClientCertificate,

    #[error("Client certificate is missing organization")]
    MissingOrganization,

    #[error("Invalid client certificate: {0}")]
    InvalidClientCertificate(String),

    #[error("guard does not provide service for {0}")]
    UnsupportedOrganization(String),

    #[error("Failed to parse request: {0}")]
    MalformedRequest(String),

    // Subject identity claims
    #[error("{0}")]
    InvalidCredential(String),

    // Remote policy API and token issuer
    #[error("request {endpoint} failed with status code: {status} and response: {body}")]
    Upstream {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("request {endpoint} failed: {source}")]
    UpstreamTransport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {endpoint}: {message}")]
    UpstreamDecode { endpoint: String, message: String },

    #[error("failed to refresh rbac token: {0}")]
    Token(#[from] TokenError),

    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        Self::InvalidCredential(msg.into())
    }

    /// Errors caused by the caller, never retried
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingClientCertificate
                | Self::MissingOrganization
                | Self::InvalidClientCertificate(_)
                | Self::UnsupportedOrganization(_)
                | Self::MalformedRequest(_)
        )
    }

    #[must_use]
    pub const fn is_credential(&self) -> bool {
        matches!(self, Self::InvalidCredential(_))
    }

    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::UpstreamTransport { .. } | Self::UpstreamDecode { .. }
        )
    }

    #[must_use]
    pub const fn is_token(&self) -> bool {
        matches!(self, Self::Token(_))
    }

    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// HTTP status a webhook handler answers with for this error.
    ///
    /// Only client errors change the status. Every other failure is rendered
    /// inside a 200 review response as a deny or an unauthenticated status.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
