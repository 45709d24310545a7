//! Client side of the aggregator and extender protocols: request PDU
//! construction, response authentication and payload extraction. The actual
//! byte shipping happens behind the [`Transport`] collaborator.

mod aggregator;
mod extender;
pub mod mock;
mod pdu;
mod transport;

pub use aggregator::{AggregatorClient, SignatureResponse};
pub use extender::{CalendarResponse, ExtenderClient};
pub use pdu::{ServiceConfig, MAX_RESPONSE_SIZE};
pub use transport::{FileTransport, MemoryTransport, Transport, TransportError};

use thiserror::Error;

use hash::{HashAlgorithm, HashError};
use hashchain::ChainError;
use tlv::TlvError;

/// One service endpoint plus the credentials used to authenticate the
/// request/response exchange with it.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub uri: String,
    pub login_id: String,
    pub password: String,
    pub hmac_algorithm: HashAlgorithm,
}

impl ServiceEndpoint {
    pub fn new(uri: &str, login_id: &str, password: &str) -> Self {
        ServiceEndpoint {
            uri: uri.to_owned(),
            login_id: login_id.to_owned(),
            password: password.to_owned(),
            hmac_algorithm: HashAlgorithm::Sha2_256,
        }
    }

    pub fn with_hmac_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hmac_algorithm = algorithm;
        self
    }
}

/// Upstream service failures, decoded from non-zero response statuses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service rejected the request: {0}")]
    InvalidRequest(String),
    #[error("service rejected the payload: {0}")]
    InvalidPayload(String),
    #[error("service authentication failure: {0}")]
    AuthenticationFailure(String),
    #[error("upstream error: {0}")]
    UpstreamError(String),
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
    #[error("service error 0x{status:x}: {message}")]
    Upstream { status: u64, message: String },
}

impl ServiceError {
    pub fn from_status(status: u64, message: String) -> Self {
        match status {
            0x101 => ServiceError::InvalidRequest(message),
            0x102 => ServiceError::InvalidPayload(message),
            0x200..=0x2ff => ServiceError::AuthenticationFailure(message),
            0x300 => ServiceError::UpstreamError(message),
            0x301 => ServiceError::UpstreamTimeout(message),
            status => ServiceError::Upstream { status, message },
        }
    }
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Record(#[from] signature::SignatureError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("response of {0} bytes exceeds the size cap")]
    ResponseTooLarge(usize),
    #[error("unexpected response PDU tag 0x{0:03x}")]
    UnexpectedPduTag(u16),
    #[error("aggregator answered a v2 request with a v1 PDU")]
    AggrPduV1Response,
    #[error("extender answered a v2 request with a v1 PDU")]
    ExtPduV1Response,
    #[error("response header is not the first PDU element")]
    HeaderNotFirst,
    #[error("response MAC is not the last PDU element")]
    HmacNotLast,
    #[error("response MAC uses {actual}, {expected} is configured")]
    HmacAlgorithmMismatch {
        expected: HashAlgorithm,
        actual: HashAlgorithm,
    },
    #[error("response MAC does not match")]
    HmacMismatch,
    #[error("response carries request id {actual}, expected {expected}")]
    RequestIdMismatch { expected: u64, actual: u64 },
    #[error("response carries no payload")]
    MissingResponsePayload,
    #[error("response carries more than one payload")]
    MultipleResponsePayloads,
}
