//! The publications file: a signed container of calendar publications and
//! the certificates trusted to authenticate calendar roots.
//!
//! Layout: an 8-byte magic, a header element, certificate records,
//! publication records in time order, and a trailing CMS/PKCS#7 signature
//! covering every preceding byte. The PKI math itself lives behind the
//! [`TrustStore`] collaborator.

mod truststore;

pub use truststore::{CertConstraint, PkiError, TrustStore, OID_EMAIL};

use log::debug;
use thiserror::Error;
use tlv::{Tlv, TlvError};

use hash::HashError;
use signature::{PublicationRecord, SignatureError};

pub const MAGIC: [u8; 8] = *b"KSIPUBLF";

const TAG_HEADER: u16 = 0x701;
const TAG_CERTIFICATE_RECORD: u16 = 0x702;
const TAG_PUBLICATION_RECORD: u16 = 0x703;
const TAG_CMS_SIGNATURE: u16 = 0x704;

const TAG_HEADER_VERSION: u16 = 0x01;
const TAG_HEADER_CREATION_TIME: u16 = 0x02;
const TAG_HEADER_REPOSITORY_URI: u16 = 0x03;

const TAG_CERT_ID: u16 = 0x01;
const TAG_CERT_DER: u16 = 0x02;

/// Parsers accept files up to this size.
pub const MAX_FILE_SIZE: usize = 0x10_0000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubFileError {
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Record(#[from] SignatureError),
    #[error(transparent)]
    Pki(#[from] PkiError),
    #[error("publications file does not start with the magic bytes")]
    BadMagic,
    #[error("publications file exceeds {MAX_FILE_SIZE} bytes")]
    TooLarge,
    #[error("publications file header is missing or not the first element")]
    HeaderNotFirst,
    #[error("publications file signature is missing or not the last element")]
    SignatureNotLast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationsHeader {
    pub version: u64,
    pub creation_time: u64,
    pub repository_uri: Option<String>,
}

/// A trusted certificate, addressed by the CRC32 of its DER encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub id: Vec<u8>,
    pub der: Vec<u8>,
}

impl CertificateRecord {
    /// The identifier a conforming publisher assigns: CRC32 over the DER.
    pub fn computed_id(&self) -> [u8; 4] {
        crc32fast::hash(&self.der).to_be_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationsFile {
    raw: Vec<u8>,
    signed_len: usize,
    header: PublicationsHeader,
    certificates: Vec<CertificateRecord>,
    publications: Vec<PublicationRecord>,
    cms_signature: Vec<u8>,
}

impl PublicationsFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, PubFileError> {
        if bytes.len() > MAX_FILE_SIZE {
            return Err(PubFileError::TooLarge);
        }
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(PubFileError::BadMagic);
        }

        let mut cursor = &bytes[MAGIC.len()..];
        let mut header = None;
        let mut certificates = Vec::new();
        let mut publications = Vec::new();
        let mut cms = None;
        let mut first = true;
        while !cursor.is_empty() {
            let offset = bytes.len() - cursor.len();
            let element = Tlv::read_one(&mut cursor)?;
            if cms.is_some() {
                // Content after the signature is not covered by it.
                return Err(PubFileError::SignatureNotLast);
            }
            match element.tag() {
                TAG_HEADER if first => header = Some(parse_header(&element)?),
                TAG_HEADER => return Err(PubFileError::HeaderNotFirst),
                TAG_CERTIFICATE_RECORD => certificates.push(parse_certificate(&element)?),
                TAG_PUBLICATION_RECORD => publications.push(PublicationRecord::from_tlv(&element)?),
                TAG_CMS_SIGNATURE => cms = Some((offset, element.as_bytes().to_vec())),
                tag if element.is_non_critical() => {
                    debug!("skipping unknown non-critical element 0x{tag:03x}");
                }
                tag => return Err(TlvError::UnknownCriticalElement { tag }.into()),
            }
            first = false;
        }
        let header = header.ok_or(PubFileError::HeaderNotFirst)?;
        let (signed_len, cms_signature) = cms.ok_or(PubFileError::SignatureNotLast)?;
        debug!(
            "parsed publications file: {} certificate(s), {} publication(s)",
            certificates.len(),
            publications.len()
        );
        Ok(PublicationsFile {
            raw: bytes.to_vec(),
            signed_len,
            header,
            certificates,
            publications,
            cms_signature,
        })
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.raw.clone()
    }

    pub fn header(&self) -> &PublicationsHeader {
        &self.header
    }

    pub fn certificates(&self) -> &[CertificateRecord] {
        &self.certificates
    }

    pub fn publications(&self) -> &[PublicationRecord] {
        &self.publications
    }

    /// Checks the trailing signature over the preceding bytes against the
    /// trust store and the configured certificate constraints.
    pub fn verify(
        &self,
        trust_store: &dyn TrustStore,
        constraints: &[CertConstraint],
    ) -> Result<(), PubFileError> {
        trust_store.verify_pkcs7(&self.raw[..self.signed_len], &self.cms_signature, constraints)?;
        Ok(())
    }

    pub fn certificate_by_id(&self, id: &[u8]) -> Option<&CertificateRecord> {
        self.certificates.iter().find(|c| c.id == id)
    }

    /// The publication published exactly at `time`.
    pub fn publication_by_time(&self, time: u64) -> Option<&PublicationRecord> {
        self.publications.iter().find(|p| p.data.time == time)
    }

    /// The earliest publication at or after `time`, the natural target when
    /// extending a signature aggregated at `time`.
    pub fn nearest_publication_after(&self, time: u64) -> Option<&PublicationRecord> {
        self.publications
            .iter()
            .filter(|p| p.data.time >= time)
            .min_by_key(|p| p.data.time)
    }

    pub fn latest_publication(&self) -> Option<&PublicationRecord> {
        self.publications.iter().max_by_key(|p| p.data.time)
    }
}

fn parse_header(tlv: &Tlv) -> Result<PublicationsHeader, PubFileError> {
    let children = tlv.children()?;
    tlv::reject_unknown_critical(
        &children,
        &[TAG_HEADER_VERSION, TAG_HEADER_CREATION_TIME, TAG_HEADER_REPOSITORY_URI],
    )?;
    Ok(PublicationsHeader {
        version: tlv::require(&children, TAG_HEADER_VERSION)?.as_u64()?,
        creation_time: tlv::require(&children, TAG_HEADER_CREATION_TIME)?.as_u64()?,
        repository_uri: tlv::unique(&children, TAG_HEADER_REPOSITORY_URI)?
            .map(|t| t.as_str().map(str::to_owned))
            .transpose()?,
    })
}

fn parse_certificate(tlv: &Tlv) -> Result<CertificateRecord, PubFileError> {
    let children = tlv.children()?;
    tlv::reject_unknown_critical(&children, &[TAG_CERT_ID, TAG_CERT_DER])?;
    Ok(CertificateRecord {
        id: tlv::require(&children, TAG_CERT_ID)?.as_bytes().to_vec(),
        der: tlv::require(&children, TAG_CERT_DER)?.as_bytes().to_vec(),
    })
}

/// Canonical construction used by the tests and by tooling that repackages
/// a file: magic, header, certificates, publications, trailing signature.
pub fn build_file(
    header: &PublicationsHeader,
    certificates: &[CertificateRecord],
    publications: &[PublicationRecord],
    cms_signature: &[u8],
) -> Result<Vec<u8>, PubFileError> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    let mut header_children = vec![
        Tlv::uint(TAG_HEADER_VERSION, header.version),
        Tlv::uint(TAG_HEADER_CREATION_TIME, header.creation_time),
    ];
    if let Some(uri) = &header.repository_uri {
        header_children.push(Tlv::string(TAG_HEADER_REPOSITORY_URI, uri));
    }
    Tlv::nested(TAG_HEADER, &header_children)?.write(&mut out)?;
    for cert in certificates {
        Tlv::nested(
            TAG_CERTIFICATE_RECORD,
            &[
                Tlv::raw(TAG_CERT_ID, cert.id.clone()),
                Tlv::raw(TAG_CERT_DER, cert.der.clone()),
            ],
        )?
        .write(&mut out)?;
    }
    for publication in publications {
        publication.to_tlv(TAG_PUBLICATION_RECORD).write(&mut out)?;
    }
    Tlv::raw(TAG_CMS_SIGNATURE, cms_signature).write(&mut out)?;
    Ok(out)
}
