//! The client context and the top-level signing, extending and
//! verification API.
//!
//! A [`Context`] owns the service credentials, the publications-file cache,
//! the monotonic request-id counter and the collaborator handles (transport
//! and trust store). Contexts are single-threaded by contract: use one
//! context per thread, not one context across threads.

mod error;

pub use error::Error;

pub use hash::{DataHasher, HashAlgorithm, Imprint};
pub use hashchain::{AggregationHashChain, CalendarHashChain, Direction, Link, Metadata};
pub use net::{
    FileTransport, MemoryTransport, ServiceConfig, ServiceEndpoint, Transport, TransportError,
};
pub use policy::{
    Outcome, Policy, PolicyVerificationResult, VerificationContext, VerificationError,
};
pub use pubfile::{CertConstraint, PkiError, PublicationsFile, TrustStore};
pub use signature::{PublicationData, PublicationRecord, Signature};

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use log::{debug, warn};

use net::{AggregatorClient, ExtenderClient, NetError};

/// Stored signatures larger than this are rejected before parsing.
pub const MAX_SIGNATURE_FILE_SIZE: usize = 0x1_0004;

/// How long a fetched publications file is reused before it is fetched
/// again. A zero TTL disables the cache.
pub const DEFAULT_PUBFILE_CACHE_TTL_SECS: u64 = 8 * 60 * 60;

/// Invoked with configuration a service pushed alongside a response.
pub type ConfigCallback = Box<dyn Fn(&ServiceConfig)>;

pub struct Context {
    transport: Arc<dyn Transport>,
    trust_store: Option<Arc<dyn TrustStore>>,
    aggregator: Option<ServiceEndpoint>,
    extender: Option<ServiceEndpoint>,
    publications_uri: Option<String>,
    cert_constraints: Vec<CertConstraint>,
    pubfile_cache_ttl: u64,
    pubfile_cache: RefCell<Option<(Arc<PublicationsFile>, Instant)>>,
    request_id: Cell<u64>,
    aggregator_conf_callback: Option<ConfigCallback>,
    extender_conf_callback: Option<ConfigCallback>,
}

/// Caller-supplied inputs for a verification run.
#[derive(Debug, Clone, Default)]
pub struct VerificationOptions {
    pub document_hash: Option<Imprint>,
    pub aggregation_level: u64,
    pub extending_allowed: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// A context served by the `file://` fixture transport. Production
    /// embedders install their transport with [`Context::with_transport`].
    pub fn new() -> Self {
        Self::with_transport(Arc::new(FileTransport))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Context {
            transport,
            trust_store: None,
            aggregator: None,
            extender: None,
            publications_uri: None,
            cert_constraints: Vec::new(),
            pubfile_cache_ttl: DEFAULT_PUBFILE_CACHE_TTL_SECS,
            pubfile_cache: RefCell::new(None),
            request_id: Cell::new(0),
            aggregator_conf_callback: None,
            extender_conf_callback: None,
        }
    }

    pub fn set_aggregator(&mut self, uri: &str, login_id: &str, password: &str) {
        self.aggregator = Some(ServiceEndpoint::new(uri, login_id, password));
    }

    pub fn set_extender(&mut self, uri: &str, login_id: &str, password: &str) {
        self.extender = Some(ServiceEndpoint::new(uri, login_id, password));
    }

    pub fn set_aggregator_hmac_algorithm(&mut self, algorithm: HashAlgorithm) -> Result<(), Error> {
        let endpoint = self.aggregator.as_mut().ok_or(Error::NotConfigured("aggregator"))?;
        endpoint.hmac_algorithm = algorithm;
        Ok(())
    }

    pub fn set_extender_hmac_algorithm(&mut self, algorithm: HashAlgorithm) -> Result<(), Error> {
        let endpoint = self.extender.as_mut().ok_or(Error::NotConfigured("extender"))?;
        endpoint.hmac_algorithm = algorithm;
        Ok(())
    }

    /// Points the context at a publications file. Changing the location
    /// always invalidates the cache.
    pub fn set_publications_uri(&mut self, uri: &str) {
        self.publications_uri = Some(uri.to_owned());
        *self.pubfile_cache.borrow_mut() = None;
    }

    pub fn set_publications_cache_ttl(&mut self, seconds: u64) {
        self.pubfile_cache_ttl = seconds;
    }

    pub fn set_cert_constraints(&mut self, constraints: Vec<CertConstraint>) {
        self.cert_constraints = constraints;
    }

    pub fn set_trust_store(&mut self, trust_store: Arc<dyn TrustStore>) {
        self.trust_store = Some(trust_store);
    }

    pub fn set_aggregator_conf_callback(&mut self, callback: Option<ConfigCallback>) {
        self.aggregator_conf_callback = callback;
    }

    pub fn set_extender_conf_callback(&mut self, callback: Option<ConfigCallback>) {
        self.extender_conf_callback = callback;
    }

    /// Request ids are strictly monotonic within a context; a timed-out or
    /// failed exchange still consumes its id.
    fn next_request_id(&self) -> u64 {
        let id = self.request_id.get() + 1;
        self.request_id.set(id);
        id
    }

    /// Decodes a signature and runs the internal consistency policy on it.
    pub fn parse_signature(&self, bytes: &[u8]) -> Result<Signature, Error> {
        let sig = Signature::parse(bytes)?;
        self.check_internal(&sig, None, 0)?;
        Ok(sig)
    }

    /// Decodes a signature without judging its consistency. For forensic
    /// inspection of broken material; normal loading is
    /// [`Context::parse_signature`].
    pub fn parse_signature_unverified(&self, bytes: &[u8]) -> Result<Signature, Error> {
        Ok(Signature::parse(bytes)?)
    }

    pub fn signature_from_file(&self, path: &Path) -> Result<Signature, Error> {
        let bytes = std::fs::read(path)?;
        if bytes.len() > MAX_SIGNATURE_FILE_SIZE {
            return Err(Error::FileTooLarge {
                size: bytes.len(),
                limit: MAX_SIGNATURE_FILE_SIZE,
            });
        }
        self.parse_signature(&bytes)
    }

    /// Signs a document hash.
    pub fn sign(&self, hash: &Imprint) -> Result<Signature, Error> {
        self.sign_aggregated(hash, 0)
    }

    /// Signs the root of a locally aggregated tree of the given level.
    pub fn sign_aggregated(&self, hash: &Imprint, level: u64) -> Result<Signature, Error> {
        let endpoint = self.aggregator.as_ref().ok_or(Error::NotConfigured("aggregator"))?;
        if level > 0xff {
            return Err(Error::InvalidArgument("aggregation level exceeds 255"));
        }
        if let Ok(algorithm) = hash.algorithm() {
            ensure_trusted(algorithm)?;
        }
        ensure_trusted(endpoint.hmac_algorithm)?;

        let request_id = self.next_request_id();
        let client = AggregatorClient {
            transport: &*self.transport,
            endpoint,
        };
        let response = client.request_signature(request_id, hash, level)?;
        if let (Some(config), Some(callback)) =
            (&response.config, &self.aggregator_conf_callback)
        {
            callback(config);
        }
        let sig = Signature::from_tlv(response.signature)?;
        self.check_internal(&sig, Some(hash.clone()), level)?;
        debug!("signed hash at level {level}, aggregation time {}", sig.aggregation_time());
        Ok(sig)
    }

    /// Extends a signature to the head of the calendar.
    pub fn extend(&self, sig: &Signature) -> Result<Signature, Error> {
        self.extend_inner(sig, None)
    }

    /// Extends a signature to the publication at the given time.
    pub fn extend_to(&self, sig: &Signature, publication_time: u64) -> Result<Signature, Error> {
        self.extend_inner(sig, Some(publication_time))
    }

    fn extend_inner(
        &self,
        sig: &Signature,
        publication_time: Option<u64>,
    ) -> Result<Signature, Error> {
        let endpoint = self.extender.as_ref().ok_or(Error::NotConfigured("extender"))?;
        ensure_trusted(endpoint.hmac_algorithm)?;

        let request_id = self.next_request_id();
        let client = ExtenderClient {
            transport: &*self.transport,
            endpoint,
        };
        let response =
            client.request_calendar(request_id, sig.aggregation_time(), publication_time)?;
        if let (Some(config), Some(callback)) = (&response.config, &self.extender_conf_callback) {
            callback(config);
        }

        let calendar = response.calendar;
        if let Some(target) = publication_time {
            if calendar.publication_time != target {
                return Err(Error::InvalidArgument(
                    "extender answered for a different publication time",
                ));
            }
        }
        // Both chains encode the same aggregation round, so the right links
        // (the values pinned by the published roots) must agree link for
        // link; an extra, missing or differing right link means the
        // extender answered for a different leaf.
        if let Some(old) = sig.calendar_chain() {
            if old.right_link_imprints() != calendar.right_link_imprints() {
                return Err(Error::IncompatibleHashChain);
            }
        }

        let new_publication_time = calendar.publication_time;
        let mut extended = sig.clone();
        extended.replace_calendar_chain(calendar)?;
        extended.remove_calendar_auth()?;
        if self.publications_uri.is_some() {
            let file = self.receive_publications_file()?;
            if let Some(record) = file.publication_by_time(new_publication_time) {
                extended.set_publication(record.clone())?;
            }
        }
        self.check_internal(&extended, None, 0)?;
        Ok(extended)
    }

    /// The publications file, from cache when fresh.
    pub fn receive_publications_file(&self) -> Result<Arc<PublicationsFile>, Error> {
        let uri = self
            .publications_uri
            .as_ref()
            .ok_or(Error::NotConfigured("publications file"))?;
        if self.pubfile_cache_ttl > 0 {
            if let Some((file, fetched_at)) = &*self.pubfile_cache.borrow() {
                if fetched_at.elapsed().as_secs() < self.pubfile_cache_ttl {
                    debug!("publications file served from cache");
                    return Ok(file.clone());
                }
            }
        }
        let bytes = self.transport.fetch(uri, None).map_err(NetError::from)?;
        let file = Arc::new(PublicationsFile::parse(&bytes)?);
        *self.pubfile_cache.borrow_mut() = Some((file.clone(), Instant::now()));
        Ok(file)
    }

    /// Checks the publications file signature against the trust store and
    /// the configured certificate constraints.
    pub fn verify_publications_file(&self, file: &PublicationsFile) -> Result<(), Error> {
        let trust_store = self
            .trust_store
            .as_deref()
            .ok_or(Error::NotConfigured("trust store"))?;
        file.verify(trust_store, &self.cert_constraints)?;
        Ok(())
    }

    /// Asks the aggregator for its configuration. The push callback is not
    /// involved; the caller gets the configuration directly.
    pub fn receive_aggregator_config(&self) -> Result<ServiceConfig, Error> {
        let endpoint = self.aggregator.as_ref().ok_or(Error::NotConfigured("aggregator"))?;
        ensure_trusted(endpoint.hmac_algorithm)?;
        let client = AggregatorClient {
            transport: &*self.transport,
            endpoint,
        };
        Ok(client.request_config()?)
    }

    pub fn receive_extender_config(&self) -> Result<ServiceConfig, Error> {
        let endpoint = self.extender.as_ref().ok_or(Error::NotConfigured("extender"))?;
        ensure_trusted(endpoint.hmac_algorithm)?;
        let client = ExtenderClient {
            transport: &*self.transport,
            endpoint,
        };
        Ok(client.request_config()?)
    }

    /// Evaluates a verification policy over the signature, wiring in the
    /// context's publications file, trust store and extender.
    pub fn verify_signature(
        &self,
        sig: &Signature,
        policy: &Policy,
        options: &VerificationOptions,
    ) -> Result<PolicyVerificationResult, Error> {
        let publications_file = match &self.publications_uri {
            Some(_) => match self.receive_publications_file() {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!("publications file unavailable for verification: {err}");
                    None
                }
            },
            None => None,
        };
        let calendar_source = ContextCalendarSource(self);
        let mut ctx = VerificationContext::new(sig);
        ctx.document_hash = options.document_hash.clone();
        ctx.aggregation_level = options.aggregation_level;
        ctx.extending_allowed = options.extending_allowed;
        ctx.publications_file = publications_file.as_deref();
        ctx.trust_store = self.trust_store.as_deref();
        ctx.cert_constraints = &self.cert_constraints;
        if self.extender.is_some() {
            ctx.calendar_provider = Some(&calendar_source);
        }
        Ok(policy::verify(policy, &ctx))
    }

    fn check_internal(
        &self,
        sig: &Signature,
        document_hash: Option<Imprint>,
        aggregation_level: u64,
    ) -> Result<(), Error> {
        let mut ctx = VerificationContext::new(sig);
        ctx.document_hash = document_hash;
        ctx.aggregation_level = aggregation_level;
        let result = policy::verify(&Policy::internal(), &ctx);
        if !result.is_ok() {
            return Err(Error::Verification(result));
        }
        Ok(())
    }
}

struct ContextCalendarSource<'a>(&'a Context);

impl policy::CalendarProvider for ContextCalendarSource<'_> {
    fn extended_calendar(
        &self,
        aggregation_time: u64,
        publication_time: Option<u64>,
    ) -> anyhow::Result<CalendarHashChain> {
        let endpoint = self
            .0
            .extender
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("extender is not configured"))?;
        let client = ExtenderClient {
            transport: &*self.0.transport,
            endpoint,
        };
        let response = client.request_calendar(
            self.0.next_request_id(),
            aggregation_time,
            publication_time,
        )?;
        Ok(response.calendar)
    }
}

fn ensure_trusted(algorithm: HashAlgorithm) -> Result<(), Error> {
    algorithm
        .ensure_trusted_at(unix_now())
        .map_err(|_| Error::UntrustedHashAlgorithm(algorithm))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
