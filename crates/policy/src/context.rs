//! Everything a verification run may consult, gathered in one place.

use std::cell::RefCell;

use hash::Imprint;
use hashchain::CalendarHashChain;
use pubfile::{CertConstraint, PublicationsFile, TrustStore};
use signature::Signature;

/// Supplies extended calendar chains on demand; verification policies that
/// consult the calendar database go through this seam.
pub trait CalendarProvider {
    /// The calendar chain from `aggregation_time` to `publication_time`,
    /// or to the calendar head when no target is given.
    fn extended_calendar(
        &self,
        aggregation_time: u64,
        publication_time: Option<u64>,
    ) -> anyhow::Result<CalendarHashChain>;
}

pub struct VerificationContext<'a> {
    pub signature: &'a Signature,
    /// Hash of the original document, when the caller has it.
    pub document_hash: Option<Imprint>,
    /// Level the document hash was aggregated to locally before signing.
    pub aggregation_level: u64,
    pub publications_file: Option<&'a PublicationsFile>,
    pub extending_allowed: bool,
    pub calendar_provider: Option<&'a dyn CalendarProvider>,
    pub trust_store: Option<&'a dyn TrustStore>,
    pub cert_constraints: &'a [CertConstraint],
    extended: RefCell<Vec<(Option<u64>, CalendarHashChain)>>,
}

impl<'a> VerificationContext<'a> {
    pub fn new(signature: &'a Signature) -> Self {
        VerificationContext {
            signature,
            document_hash: None,
            aggregation_level: 0,
            publications_file: None,
            extending_allowed: false,
            calendar_provider: None,
            trust_store: None,
            cert_constraints: &[],
            extended: RefCell::new(Vec::new()),
        }
    }

    /// Fetches (and caches) the extended calendar chain for the signature's
    /// aggregation time, per target publication time.
    pub(crate) fn extended_calendar(
        &self,
        publication_time: Option<u64>,
    ) -> anyhow::Result<CalendarHashChain> {
        let provider = self
            .calendar_provider
            .ok_or_else(|| anyhow::anyhow!("no calendar source available"))?;
        if let Some((_, chain)) = self
            .extended
            .borrow()
            .iter()
            .find(|(target, _)| *target == publication_time)
        {
            return Ok(chain.clone());
        }
        let chain =
            provider.extended_calendar(self.signature.aggregation_time(), publication_time)?;
        self.extended
            .borrow_mut()
            .push((publication_time, chain.clone()));
        Ok(chain)
    }
}
