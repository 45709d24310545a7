//! Component records carried inside a signature: publication data, PKI
//! signature data, and the calendar/aggregation authentication records.

use hash::Imprint;
use tlv::{Tlv, TlvError};

use crate::SignatureError;

pub(crate) const TAG_PUBLICATION_DATA: u16 = 0x10;
const TAG_PUBLICATION_TIME: u16 = 0x02;
const TAG_PUBLICATION_HASH: u16 = 0x04;

const TAG_PUBLICATION_REFERENCE: u16 = 0x09;
const TAG_PUBLICATIONS_REPOSITORY_URI: u16 = 0x0a;

const TAG_SIGNATURE_ALGORITHM: u16 = 0x0b;
const TAG_SIGNATURE_DATA: u16 = 0x0c;

const TAG_SIG_VALUE: u16 = 0x01;
const TAG_SIG_CERTIFICATE: u16 = 0x02;
const TAG_SIG_CERTIFICATE_ID: u16 = 0x03;
const TAG_SIG_CERT_REPOSITORY_URI: u16 = 0x04;

const TAG_AGGREGATION_TIME: u16 = 0x02;
const TAG_CHAIN_INDEX: u16 = 0x03;
const TAG_INPUT_HASH: u16 = 0x05;

const TAG_TST_INFO_PREFIX: u16 = 0x10;
const TAG_TST_INFO_SUFFIX: u16 = 0x11;
const TAG_TST_INFO_ALGORITHM: u16 = 0x12;
const TAG_SIG_ATTR_PREFIX: u16 = 0x13;
const TAG_SIG_ATTR_SUFFIX: u16 = 0x14;
const TAG_SIG_ATTR_ALGORITHM: u16 = 0x15;

/// A published calendar root: the time it was published and its imprint.
/// The element's serialized bytes are retained, since they are the exact
/// message a calendar authentication record's PKI signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationData {
    pub time: u64,
    pub hash: Imprint,
    tlv: Tlv,
}

impl PublicationData {
    pub fn new(time: u64, hash: Imprint) -> Self {
        let tlv = Tlv::nested(
            TAG_PUBLICATION_DATA,
            &[
                Tlv::uint(TAG_PUBLICATION_TIME, time),
                Tlv::raw(TAG_PUBLICATION_HASH, hash.as_bytes()),
            ],
        )
        .expect("publication data fits");
        PublicationData { time, hash, tlv }
    }

    pub fn from_tlv(tlv: &Tlv) -> Result<Self, SignatureError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(&children, &[TAG_PUBLICATION_TIME, TAG_PUBLICATION_HASH])?;
        let time = tlv::require(&children, TAG_PUBLICATION_TIME)?.as_u64()?;
        let hash =
            Imprint::from_bytes(tlv::require(&children, TAG_PUBLICATION_HASH)?.as_bytes())?;
        Ok(PublicationData {
            time,
            hash,
            tlv: tlv.clone(),
        })
    }

    pub fn to_tlv(&self) -> Tlv {
        self.tlv.clone()
    }

    /// The serialized element, the exact bytes a PKI signature attests.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, TlvError> {
        self.tlv.serialize()
    }
}

/// A publication record: publication data plus bibliographic references.
/// The same shape appears in signatures (tag 0x803) and in the publications
/// file (tag 0x703); the container tag is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    pub data: PublicationData,
    pub references: Vec<String>,
    pub repository_uris: Vec<String>,
}

impl PublicationRecord {
    pub fn new(data: PublicationData) -> Self {
        PublicationRecord {
            data,
            references: Vec::new(),
            repository_uris: Vec::new(),
        }
    }

    pub fn from_tlv(tlv: &Tlv) -> Result<Self, SignatureError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_PUBLICATION_DATA,
                TAG_PUBLICATION_REFERENCE,
                TAG_PUBLICATIONS_REPOSITORY_URI,
            ],
        )?;
        let data = PublicationData::from_tlv(tlv::require(&children, TAG_PUBLICATION_DATA)?)?;
        let references = tlv::find_all(&children, TAG_PUBLICATION_REFERENCE)
            .map(|t| t.as_str().map(str::to_owned))
            .collect::<Result<_, _>>()?;
        let repository_uris = tlv::find_all(&children, TAG_PUBLICATIONS_REPOSITORY_URI)
            .map(|t| t.as_str().map(str::to_owned))
            .collect::<Result<_, _>>()?;
        Ok(PublicationRecord {
            data,
            references,
            repository_uris,
        })
    }

    pub fn to_tlv(&self, tag: u16) -> Tlv {
        let mut children = vec![self.data.to_tlv()];
        for r in &self.references {
            children.push(Tlv::string(TAG_PUBLICATION_REFERENCE, r));
        }
        for u in &self.repository_uris {
            children.push(Tlv::string(TAG_PUBLICATIONS_REPOSITORY_URI, u));
        }
        Tlv::nested(tag, &children).expect("publication record fits")
    }
}

/// A PKI signature over some attested bytes, together with exactly one way
/// to locate the signing certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureData {
    pub value: Vec<u8>,
    pub certificate: Option<Vec<u8>>,
    pub certificate_id: Option<Vec<u8>>,
    pub cert_repository_uri: Option<String>,
}

impl SignatureData {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, SignatureError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_SIG_VALUE,
                TAG_SIG_CERTIFICATE,
                TAG_SIG_CERTIFICATE_ID,
                TAG_SIG_CERT_REPOSITORY_URI,
            ],
        )?;
        let value = tlv::require(&children, TAG_SIG_VALUE)?.as_bytes().to_vec();
        let certificate =
            tlv::unique(&children, TAG_SIG_CERTIFICATE)?.map(|t| t.as_bytes().to_vec());
        let certificate_id =
            tlv::unique(&children, TAG_SIG_CERTIFICATE_ID)?.map(|t| t.as_bytes().to_vec());
        let cert_repository_uri = tlv::unique(&children, TAG_SIG_CERT_REPOSITORY_URI)?
            .map(|t| t.as_str().map(str::to_owned))
            .transpose()?;
        let references = usize::from(certificate.is_some())
            + usize::from(certificate_id.is_some())
            + usize::from(cert_repository_uri.is_some());
        match references {
            0 => Err(SignatureError::MissingCertificateReference),
            1 => Ok(SignatureData {
                value,
                certificate,
                certificate_id,
                cert_repository_uri,
            }),
            _ => Err(SignatureError::AmbiguousCertificateReference),
        }
    }

    pub fn to_tlv(&self) -> Tlv {
        let mut children = vec![Tlv::raw(TAG_SIG_VALUE, self.value.clone())];
        if let Some(cert) = &self.certificate {
            children.push(Tlv::raw(TAG_SIG_CERTIFICATE, cert.clone()));
        }
        if let Some(id) = &self.certificate_id {
            children.push(Tlv::raw(TAG_SIG_CERTIFICATE_ID, id.clone()));
        }
        if let Some(uri) = &self.cert_repository_uri {
            children.push(Tlv::string(TAG_SIG_CERT_REPOSITORY_URI, uri));
        }
        Tlv::nested(TAG_SIGNATURE_DATA, &children).expect("signature data fits")
    }
}

/// A server-issued PKI attestation of a published calendar root, used to
/// authenticate signatures newer than the latest printed publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarAuthRecord {
    pub publication_data: PublicationData,
    pub signature_algorithm: String,
    pub signature_data: SignatureData,
}

impl CalendarAuthRecord {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, SignatureError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[TAG_PUBLICATION_DATA, TAG_SIGNATURE_ALGORITHM, TAG_SIGNATURE_DATA],
        )?;
        let publication_data =
            PublicationData::from_tlv(tlv::require(&children, TAG_PUBLICATION_DATA)?)?;
        let signature_algorithm = tlv::require(&children, TAG_SIGNATURE_ALGORITHM)?
            .as_str()?
            .to_owned();
        let signature_data = SignatureData::from_tlv(tlv::require(&children, TAG_SIGNATURE_DATA)?)?;
        Ok(CalendarAuthRecord {
            publication_data,
            signature_algorithm,
            signature_data,
        })
    }

    pub fn to_tlv(&self, tag: u16) -> Tlv {
        Tlv::nested(
            tag,
            &[
                self.publication_data.to_tlv(),
                Tlv::string(TAG_SIGNATURE_ALGORITHM, &self.signature_algorithm),
                self.signature_data.to_tlv(),
            ],
        )
        .expect("auth record fits")
    }
}

/// A PKI attestation of an aggregation round root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationAuthRecord {
    pub aggregation_time: u64,
    pub chain_index: Vec<u64>,
    pub input_hash: Imprint,
    pub signature_algorithm: String,
    pub signature_data: SignatureData,
}

impl AggregationAuthRecord {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, SignatureError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_AGGREGATION_TIME,
                TAG_CHAIN_INDEX,
                TAG_INPUT_HASH,
                TAG_SIGNATURE_ALGORITHM,
                TAG_SIGNATURE_DATA,
            ],
        )?;
        Ok(AggregationAuthRecord {
            aggregation_time: tlv::require(&children, TAG_AGGREGATION_TIME)?.as_u64()?,
            chain_index: tlv::find_all(&children, TAG_CHAIN_INDEX)
                .map(Tlv::as_u64)
                .collect::<Result<_, _>>()?,
            input_hash: Imprint::from_bytes(tlv::require(&children, TAG_INPUT_HASH)?.as_bytes())?,
            signature_algorithm: tlv::require(&children, TAG_SIGNATURE_ALGORITHM)?
                .as_str()?
                .to_owned(),
            signature_data: SignatureData::from_tlv(tlv::require(&children, TAG_SIGNATURE_DATA)?)?,
        })
    }
}

/// A legacy timestamp compatibility record. Retained verbatim; nothing in
/// the current verification path recomputes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rfc3161Record {
    pub aggregation_time: u64,
    pub chain_index: Vec<u64>,
    pub input_hash: Imprint,
    pub tst_info_prefix: Vec<u8>,
    pub tst_info_suffix: Vec<u8>,
    pub tst_info_algorithm: u8,
    pub sig_attr_prefix: Vec<u8>,
    pub sig_attr_suffix: Vec<u8>,
    pub sig_attr_algorithm: u8,
}

impl Rfc3161Record {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, SignatureError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_AGGREGATION_TIME,
                TAG_CHAIN_INDEX,
                TAG_INPUT_HASH,
                TAG_TST_INFO_PREFIX,
                TAG_TST_INFO_SUFFIX,
                TAG_TST_INFO_ALGORITHM,
                TAG_SIG_ATTR_PREFIX,
                TAG_SIG_ATTR_SUFFIX,
                TAG_SIG_ATTR_ALGORITHM,
            ],
        )?;
        Ok(Rfc3161Record {
            aggregation_time: tlv::require(&children, TAG_AGGREGATION_TIME)?.as_u64()?,
            chain_index: tlv::find_all(&children, TAG_CHAIN_INDEX)
                .map(Tlv::as_u64)
                .collect::<Result<_, _>>()?,
            input_hash: Imprint::from_bytes(tlv::require(&children, TAG_INPUT_HASH)?.as_bytes())?,
            tst_info_prefix: tlv::require(&children, TAG_TST_INFO_PREFIX)?.as_bytes().to_vec(),
            tst_info_suffix: tlv::require(&children, TAG_TST_INFO_SUFFIX)?.as_bytes().to_vec(),
            tst_info_algorithm: tlv::require(&children, TAG_TST_INFO_ALGORITHM)?.as_u64()? as u8,
            sig_attr_prefix: tlv::require(&children, TAG_SIG_ATTR_PREFIX)?.as_bytes().to_vec(),
            sig_attr_suffix: tlv::require(&children, TAG_SIG_ATTR_SUFFIX)?.as_bytes().to_vec(),
            sig_attr_algorithm: tlv::require(&children, TAG_SIG_ATTR_ALGORITHM)?.as_u64()? as u8,
        })
    }
}
