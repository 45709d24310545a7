//! The PKI collaborator seam. Certificate parsing, chain building and the
//! PKCS#1/PKCS#7 math are supplied by the embedder; the core only states
//! what it needs verified.

use thiserror::Error;

/// Subject e-mail address, the constraint publications are usually pinned to.
pub const OID_EMAIL: &str = "1.2.840.113549.1.9.1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PkiError {
    #[error("certificate not found")]
    CertificateNotFound,
    #[error("certificate not trusted: {0}")]
    CertificateNotTrusted(String),
    #[error("certificate expired or not yet valid")]
    CertificateExpired,
    #[error("PKI signature verification failed")]
    SignatureFailure,
}

/// A required attribute of the signing certificate's subject, keyed by OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertConstraint {
    pub oid: String,
    pub value: String,
}

impl CertConstraint {
    pub fn new(oid: &str, value: &str) -> Self {
        CertConstraint {
            oid: oid.to_owned(),
            value: value.to_owned(),
        }
    }

    pub fn email(value: &str) -> Self {
        Self::new(OID_EMAIL, value)
    }
}

/// Verification operations the core delegates to the embedder's PKI stack.
pub trait TrustStore {
    /// Verifies a PKCS#1 signature over `data`, made with the key of the
    /// given DER certificate using the algorithm named by `algorithm_oid`.
    fn verify_pkcs1(
        &self,
        data: &[u8],
        algorithm_oid: &str,
        signature: &[u8],
        certificate_der: &[u8],
    ) -> Result<(), PkiError>;

    /// Verifies a detached CMS/PKCS#7 signature over `data`, requiring the
    /// signing certificate to chain to a trusted root and to satisfy every
    /// constraint.
    fn verify_pkcs7(
        &self,
        data: &[u8],
        signature: &[u8],
        constraints: &[CertConstraint],
    ) -> Result<(), PkiError>;

    /// The not-before/not-after validity window of a DER certificate,
    /// in UTC seconds.
    fn certificate_validity(&self, certificate_der: &[u8]) -> Result<(u64, u64), PkiError>;
}
