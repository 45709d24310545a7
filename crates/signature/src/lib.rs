//! The signature record: a stack of aggregation hash chains, an optional
//! calendar hash chain and the records authenticating its root.
//!
//! A parsed signature keeps the element it was decoded from as its base;
//! serialization re-emits those bytes, so unknown non-critical elements and
//! original header forms survive a parse/serialize round trip. Mutations
//! (extending) splice subtrees of the base in place.

mod records;

pub use records::{
    AggregationAuthRecord, CalendarAuthRecord, PublicationData, PublicationRecord, Rfc3161Record,
    SignatureData,
};

use log::debug;
use thiserror::Error;
use tlv::{Tlv, TlvError};

use hash::{HashAlgorithm, HashError, Imprint};
use hashchain::{AggregationHashChain, CalendarHashChain, ChainError};

pub const TAG_SIGNATURE: u16 = 0x800;
pub const TAG_AGGREGATION_CHAIN: u16 = 0x801;
pub const TAG_CALENDAR_CHAIN: u16 = 0x802;
pub const TAG_PUBLICATION_RECORD: u16 = 0x803;
pub const TAG_AGGREGATION_AUTH_RECORD: u16 = 0x804;
pub const TAG_CALENDAR_AUTH_RECORD: u16 = 0x805;
pub const TAG_RFC3161_RECORD: u16 = 0x806;

/// Element tags a signature container may carry.
pub const SIGNATURE_ELEMENT_TAGS: [u16; 6] = [
    TAG_AGGREGATION_CHAIN,
    TAG_CALENDAR_CHAIN,
    TAG_PUBLICATION_RECORD,
    TAG_AGGREGATION_AUTH_RECORD,
    TAG_CALENDAR_AUTH_RECORD,
    TAG_RFC3161_RECORD,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("signature does not contain any aggregation chains")]
    MissingAggregationChain,
    #[error("signature does not contain a calendar chain")]
    NoCalendarChain,
    #[error("signature carries both a calendar authentication record and a publication record")]
    AuthRecordConflict,
    #[error("signed data carries no certificate reference")]
    MissingCertificateReference,
    #[error("signed data carries more than one certificate reference")]
    AmbiguousCertificateReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    base: Tlv,
    aggregation_chains: Vec<AggregationHashChain>,
    calendar_chain: Option<CalendarHashChain>,
    calendar_auth: Option<CalendarAuthRecord>,
    aggregation_auth: Option<AggregationAuthRecord>,
    publication: Option<PublicationRecord>,
    rfc3161: Option<Rfc3161Record>,
}

impl Signature {
    /// Decodes one signature element from the given bytes; the buffer must
    /// contain exactly that element.
    pub fn parse(bytes: &[u8]) -> Result<Self, SignatureError> {
        Self::from_tlv(Tlv::parse(bytes)?)
    }

    /// Builds a signature from an already-decoded container element, e.g.
    /// one assembled out of an aggregation response.
    pub fn from_tlv(base: Tlv) -> Result<Self, SignatureError> {
        if base.tag() != TAG_SIGNATURE {
            return Err(TlvError::UnexpectedTag {
                expected: TAG_SIGNATURE,
                actual: base.tag(),
            }
            .into());
        }
        let children = base.children()?;
        tlv::reject_unknown_critical(&children, &SIGNATURE_ELEMENT_TAGS)?;

        let mut aggregation_chains = tlv::find_all(&children, TAG_AGGREGATION_CHAIN)
            .map(AggregationHashChain::from_tlv)
            .collect::<Result<Vec<_>, _>>()?;
        if aggregation_chains.is_empty() {
            return Err(SignatureError::MissingAggregationChain);
        }
        // Leaf chain first: the chain closest to the document carries the
        // longest index.
        aggregation_chains.sort_by_key(|c| std::cmp::Reverse(c.chain_index.len()));

        let calendar_chain = tlv::unique(&children, TAG_CALENDAR_CHAIN)?
            .map(CalendarHashChain::from_tlv)
            .transpose()?;
        let calendar_auth = tlv::unique(&children, TAG_CALENDAR_AUTH_RECORD)?
            .map(CalendarAuthRecord::from_tlv)
            .transpose()?;
        let aggregation_auth = tlv::unique(&children, TAG_AGGREGATION_AUTH_RECORD)?
            .map(AggregationAuthRecord::from_tlv)
            .transpose()?;
        let publication = tlv::unique(&children, TAG_PUBLICATION_RECORD)?
            .map(PublicationRecord::from_tlv)
            .transpose()?;
        let rfc3161 = tlv::unique(&children, TAG_RFC3161_RECORD)?
            .map(Rfc3161Record::from_tlv)
            .transpose()?;

        if calendar_auth.is_some() && publication.is_some() {
            return Err(SignatureError::AuthRecordConflict);
        }

        debug!(
            "parsed signature: {} aggregation chain(s), calendar: {}",
            aggregation_chains.len(),
            calendar_chain.is_some()
        );
        Ok(Signature {
            base,
            aggregation_chains,
            calendar_chain,
            calendar_auth,
            aggregation_auth,
            publication,
            rfc3161,
        })
    }

    /// Emits the retained base element.
    pub fn serialize(&self) -> Result<Vec<u8>, SignatureError> {
        Ok(self.base.serialize()?)
    }

    pub fn base_tlv(&self) -> &Tlv {
        &self.base
    }

    /// Aggregation chains ordered leaf (document side) to root.
    pub fn aggregation_chains(&self) -> &[AggregationHashChain] {
        &self.aggregation_chains
    }

    pub fn calendar_chain(&self) -> Option<&CalendarHashChain> {
        self.calendar_chain.as_ref()
    }

    pub fn calendar_auth(&self) -> Option<&CalendarAuthRecord> {
        self.calendar_auth.as_ref()
    }

    pub fn aggregation_auth(&self) -> Option<&AggregationAuthRecord> {
        self.aggregation_auth.as_ref()
    }

    pub fn publication(&self) -> Option<&PublicationRecord> {
        self.publication.as_ref()
    }

    pub fn rfc3161(&self) -> Option<&Rfc3161Record> {
        self.rfc3161.as_ref()
    }

    /// The hash the signature attests: the leaf chain's input.
    pub fn document_hash(&self) -> &Imprint {
        &self.aggregation_chains[0].input_hash
    }

    /// Algorithm of the attested document hash.
    pub fn hash_algorithm(&self) -> Result<HashAlgorithm, SignatureError> {
        Ok(self.document_hash().algorithm()?)
    }

    /// A hasher pre-configured to digest documents for comparison against
    /// this signature.
    pub fn new_document_hasher(&self) -> Result<hash::DataHasher, SignatureError> {
        Ok(hash::DataHasher::open(self.hash_algorithm()?))
    }

    /// The aggregation round the document entered.
    pub fn aggregation_time(&self) -> u64 {
        self.aggregation_chains[0].aggregation_time
    }

    /// Time the signature binds the document to, as recorded by the
    /// calendar chain.
    pub fn signing_time(&self) -> Result<u64, SignatureError> {
        let calendar = self.calendar_chain.as_ref().ok_or(SignatureError::NoCalendarChain)?;
        Ok(calendar.aggregation_time())
    }

    /// Dot-joined client identifiers along the aggregation path.
    pub fn signer_identity(&self) -> String {
        hashchain::signer_identity(&self.aggregation_chains)
    }

    /// Swaps in a calendar chain, splicing the base element so all other
    /// content stays byte-identical. A signature without a calendar chain
    /// gains one at the end of the container.
    pub fn replace_calendar_chain(
        &mut self,
        chain: CalendarHashChain,
    ) -> Result<(), SignatureError> {
        let encoded = chain.to_tlv();
        if !self.base.replace_child(TAG_CALENDAR_CHAIN, &encoded)? {
            self.base.push_child(&encoded)?;
        }
        self.calendar_chain = Some(chain);
        Ok(())
    }

    /// Drops the calendar authentication record, if any.
    pub fn remove_calendar_auth(&mut self) -> Result<(), SignatureError> {
        self.base.remove_children(TAG_CALENDAR_AUTH_RECORD)?;
        self.calendar_auth = None;
        Ok(())
    }

    /// Installs a publication record, dropping any previous one.
    pub fn set_publication(&mut self, record: PublicationRecord) -> Result<(), SignatureError> {
        let encoded = record.to_tlv(TAG_PUBLICATION_RECORD);
        if !self.base.replace_child(TAG_PUBLICATION_RECORD, &encoded)? {
            self.base.push_child(&encoded)?;
        }
        self.publication = Some(record);
        Ok(())
    }
}
