//! Client certificate identity
//!
//! The Organization of the client certificate selects the provider that
//! answers a review.

use std::sync::Arc;

use rustls_pki_types::CertificateDer;

use crate::{Error, Result};

/// Certificate chain presented by the client, attached to every request on the connection
#[derive(Debug, Clone, Default)]
pub struct PeerCertificates(Arc<[CertificateDer<'static>]>);

impl PeerCertificates {
    #[must_use]
    pub fn new(chain: Vec<CertificateDer<'static>>) -> Self {
        Self(chain.into())
    }

    /// Copy the chain out of a completed handshake
    #[must_use]
    pub fn from_handshake(chain: Option<&[CertificateDer<'_>]>) -> Self {
        chain.map_or_else(Self::default, |certs| {
            Self::new(certs.iter().map(|c| c.clone().into_owned()).collect())
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Leaf certificate, if any
    #[must_use]
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.0.first()
    }
}

/// Caller identity taken from the leaf certificate subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// First Organization RDN
    pub organization: String,
    pub common_name: String,
}

impl PeerIdentity {
    pub fn from_certificates(certs: Option<&PeerCertificates>) -> Result<Self> {
        let leaf = certs
            .and_then(PeerCertificates::leaf)
            .ok_or(Error::MissingClientCertificate)?;
        Self::from_der(leaf.as_ref())
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, parsed) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| Error::InvalidClientCertificate(e.to_string()))?;

        let subject = parsed.subject();
        let organization = subject
            .iter_organization()
            .next()
            .and_then(|o| o.as_str().ok())
            .filter(|o| !o.is_empty())
            .ok_or(Error::MissingOrganization)?;

        let common_name = subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default();

        Ok(Self {
            organization: organization.to_string(),
            common_name: common_name.to_string(),
        })
    }

    /// Organization lowercased for registry lookup
    #[must_use]
    pub fn org(&self) -> String {
        self.organization.to_lowercase()
    }
}
