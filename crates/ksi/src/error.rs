//! The unified error surface of the client library.

use thiserror::Error;

use hash::{HashAlgorithm, HashError};
use hashchain::ChainError;
use net::NetError;
use policy::PolicyVerificationResult;
use pubfile::{PkiError, PubFileError};
use signature::SignatureError;
use tlv::TlvError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} service is not configured")]
    NotConfigured(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("input of {size} bytes exceeds the {limit}-byte limit")]
    FileTooLarge { size: usize, limit: usize },
    #[error("hash algorithm {0} is not trusted for new computations")]
    UntrustedHashAlgorithm(HashAlgorithm),
    #[error("calendar chain from the extender is incompatible with the signature")]
    IncompatibleHashChain,
    #[error("signature verification failed: {0}")]
    Verification(PolicyVerificationResult),
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    PublicationsFile(#[from] PubFileError),
    #[error(transparent)]
    Pki(#[from] PkiError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The verification trail, when the failure came out of the policy
    /// engine.
    pub fn verification_result(&self) -> Option<&PolicyVerificationResult> {
        match self {
            Error::Verification(result) => Some(result),
            _ => None,
        }
    }
}
