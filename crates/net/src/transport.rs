//! The byte-shipping collaborator. Real deployments plug in an HTTP or TCP
//! implementation; the bundled ones cover `file://` fixtures and canned
//! in-memory exchanges.

use std::cell::RefCell;
use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unsupported uri scheme in {0}")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("service answered with status {0}")]
    HttpStatus(u16),
    #[error("no response configured for {0}")]
    NoResponse(String),
}

/// Synchronous request/response exchange. A `None` body is a plain
/// retrieval (publications file download).
pub trait Transport {
    fn fetch(&self, uri: &str, body: Option<&[u8]>) -> Result<Vec<u8>, TransportError>;
}

/// Serves `file://` URIs by returning the file contents, whatever the
/// request body was. This is the fixture transport used by the tests and
/// by offline tooling.
#[derive(Debug, Default)]
pub struct FileTransport;

impl Transport for FileTransport {
    fn fetch(&self, uri: &str, _body: Option<&[u8]>) -> Result<Vec<u8>, TransportError> {
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| TransportError::UnsupportedScheme(uri.to_owned()))?;
        Ok(std::fs::read(path)?)
    }
}

/// Canned responses keyed by URI; records every exchange. Meant for tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    responses: RefCell<HashMap<String, Vec<u8>>>,
    exchanges: RefCell<Vec<(String, Option<Vec<u8>>)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: &str, response: Vec<u8>) {
        self.responses.borrow_mut().insert(uri.to_owned(), response);
    }

    /// Number of fetches performed so far.
    pub fn exchange_count(&self) -> usize {
        self.exchanges.borrow().len()
    }

    /// The body sent in the n-th exchange.
    pub fn sent_body(&self, n: usize) -> Option<Vec<u8>> {
        self.exchanges.borrow().get(n).and_then(|(_, body)| body.clone())
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, uri: &str, body: Option<&[u8]>) -> Result<Vec<u8>, TransportError> {
        self.exchanges
            .borrow_mut()
            .push((uri.to_owned(), body.map(<[u8]>::to_vec)));
        self.responses
            .borrow()
            .get(uri)
            .cloned()
            .ok_or_else(|| TransportError::NoResponse(uri.to_owned()))
    }
}
