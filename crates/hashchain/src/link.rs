//! Individual hash-chain links and their sibling payloads.

use hash::Imprint;
use tlv::{Tlv, TlvError};

use crate::ChainError;

pub(crate) const TAG_LEFT_LINK: u16 = 0x07;
pub(crate) const TAG_RIGHT_LINK: u16 = 0x08;

const TAG_LEVEL_CORRECTION: u16 = 0x01;
const TAG_SIBLING_HASH: u16 = 0x02;
const TAG_LEGACY_ID: u16 = 0x03;
const TAG_METADATA: u16 = 0x04;

const TAG_META_PADDING: u16 = 0x01;
const TAG_META_CLIENT_ID: u16 = 0x02;
const TAG_META_MACHINE_ID: u16 = 0x03;
const TAG_META_SEQUENCE_NR: u16 = 0x04;
const TAG_META_REQUEST_TIME: u16 = 0x05;

const LEGACY_ID_LEN: usize = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub(crate) fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            TAG_LEFT_LINK => Some(Direction::Left),
            TAG_RIGHT_LINK => Some(Direction::Right),
            _ => None,
        }
    }

    pub(crate) fn tag(self) -> u16 {
        match self {
            Direction::Left => TAG_LEFT_LINK,
            Direction::Right => TAG_RIGHT_LINK,
        }
    }
}

/// Client-supplied identification embedded in an aggregation link. A leading
/// padding element keeps the serialized value length even, so it can never be
/// mistaken for an imprint when folded into the chain; the padding is a wire
/// detail and is not exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    client_id: String,
    machine_id: Option<String>,
    sequence_nr: Option<u64>,
    request_time: Option<u64>,
    value: Vec<u8>,
}

impl Metadata {
    pub fn new(client_id: &str) -> Self {
        Self::build(client_id, None, None, None)
    }

    pub fn build(
        client_id: &str,
        machine_id: Option<&str>,
        sequence_nr: Option<u64>,
        request_time: Option<u64>,
    ) -> Self {
        let mut fields = Vec::new();
        let mut body = Vec::new();
        fields.push(Tlv::string(TAG_META_CLIENT_ID, client_id));
        if let Some(machine_id) = machine_id {
            fields.push(Tlv::string(TAG_META_MACHINE_ID, machine_id));
        }
        if let Some(nr) = sequence_nr {
            fields.push(Tlv::uint(TAG_META_SEQUENCE_NR, nr));
        }
        if let Some(t) = request_time {
            fields.push(Tlv::uint(TAG_META_REQUEST_TIME, t));
        }
        for field in &fields {
            field.write(&mut body).expect("metadata fields fit");
        }
        // Pick the padding width that makes the total length even.
        let pad: &[u8] = if body.len() % 2 == 0 { &[0x01, 0x01] } else { &[0x01] };
        let mut value = Vec::with_capacity(2 + pad.len() + body.len());
        Tlv::raw(TAG_META_PADDING, pad)
            .with_flags(true, true)
            .write(&mut value)
            .expect("padding fits");
        value.extend_from_slice(&body);
        Metadata {
            client_id: client_id.to_owned(),
            machine_id: machine_id.map(str::to_owned),
            sequence_nr,
            request_time,
            value,
        }
    }

    fn from_tlv(tlv: &Tlv) -> Result<Self, ChainError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_META_PADDING,
                TAG_META_CLIENT_ID,
                TAG_META_MACHINE_ID,
                TAG_META_SEQUENCE_NR,
                TAG_META_REQUEST_TIME,
            ],
        )?;
        let client_id = tlv::require(&children, TAG_META_CLIENT_ID)?.as_str()?.to_owned();
        let machine_id = tlv::unique(&children, TAG_META_MACHINE_ID)?
            .map(|t| t.as_str().map(str::to_owned))
            .transpose()?;
        let sequence_nr = tlv::unique(&children, TAG_META_SEQUENCE_NR)?
            .map(Tlv::as_u64)
            .transpose()?;
        let request_time = tlv::unique(&children, TAG_META_REQUEST_TIME)?
            .map(Tlv::as_u64)
            .transpose()?;
        Ok(Metadata {
            client_id,
            machine_id,
            sequence_nr,
            request_time,
            value: tlv.as_bytes().to_vec(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }

    pub fn sequence_nr(&self) -> Option<u64> {
        self.sequence_nr
    }

    pub fn request_time(&self) -> Option<u64> {
        self.request_time
    }

    /// The serialized element value, exactly as folded into the chain.
    pub fn value_bytes(&self) -> &[u8] {
        &self.value
    }
}

/// What sits on the other side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sibling {
    Hash(Imprint),
    Metadata(Metadata),
    /// Pre-metadata client identifier: a fixed 29-byte block carrying an
    /// embedded string.
    LegacyId { client_id: String, raw: Vec<u8> },
}

impl Sibling {
    /// Bytes this sibling contributes to the folding step.
    pub fn as_fold_bytes(&self) -> &[u8] {
        match self {
            Sibling::Hash(imprint) => imprint.as_bytes(),
            Sibling::Metadata(meta) => meta.value_bytes(),
            Sibling::LegacyId { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub direction: Direction,
    pub sibling: Sibling,
    pub level_correction: u8,
}

impl Link {
    pub fn hash(direction: Direction, sibling: Imprint) -> Self {
        Link {
            direction,
            sibling: Sibling::Hash(sibling),
            level_correction: 0,
        }
    }

    pub fn with_level_correction(mut self, level_correction: u8) -> Self {
        self.level_correction = level_correction;
        self
    }

    pub(crate) fn from_tlv(tlv: &Tlv) -> Result<Self, ChainError> {
        let direction = Direction::from_tag(tlv.tag()).ok_or(TlvError::UnexpectedTag {
            expected: TAG_LEFT_LINK,
            actual: tlv.tag(),
        })?;
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[TAG_LEVEL_CORRECTION, TAG_SIBLING_HASH, TAG_LEGACY_ID, TAG_METADATA],
        )?;
        let level_correction = match tlv::unique(&children, TAG_LEVEL_CORRECTION)? {
            Some(t) => {
                let v = t.as_u64()?;
                u8::try_from(v).map_err(|_| ChainError::LevelCorrectionTooLarge(v))?
            }
            None => 0,
        };
        let hash = tlv::unique(&children, TAG_SIBLING_HASH)?;
        let legacy = tlv::unique(&children, TAG_LEGACY_ID)?;
        let metadata = tlv::unique(&children, TAG_METADATA)?;
        let sibling = match (hash, legacy, metadata) {
            (Some(t), None, None) => Sibling::Hash(Imprint::from_bytes(t.as_bytes())?),
            (None, Some(t), None) => parse_legacy_id(t.as_bytes())?,
            (None, None, Some(t)) => Sibling::Metadata(Metadata::from_tlv(t)?),
            (None, None, None) => return Err(ChainError::MissingSibling),
            _ => return Err(ChainError::ConflictingSibling),
        };
        Ok(Link {
            direction,
            sibling,
            level_correction,
        })
    }

    pub(crate) fn to_tlv(&self) -> Tlv {
        let mut children = Vec::new();
        if self.level_correction > 0 {
            children.push(Tlv::uint(TAG_LEVEL_CORRECTION, u64::from(self.level_correction)));
        }
        match &self.sibling {
            Sibling::Hash(imprint) => children.push(Tlv::raw(TAG_SIBLING_HASH, imprint.as_bytes())),
            Sibling::LegacyId { raw, .. } => children.push(Tlv::raw(TAG_LEGACY_ID, raw.clone())),
            Sibling::Metadata(meta) => {
                children.push(Tlv::raw(TAG_METADATA, meta.value_bytes()))
            }
        }
        Tlv::nested(self.direction.tag(), &children).expect("link fields fit")
    }
}

fn parse_legacy_id(raw: &[u8]) -> Result<Sibling, ChainError> {
    if raw.len() != LEGACY_ID_LEN || raw[0] != 0x03 || raw[1] != 0x00 {
        return Err(ChainError::MalformedLegacyId);
    }
    let len = usize::from(raw[2]);
    if 3 + len > LEGACY_ID_LEN || raw[3 + len..].iter().any(|b| *b != 0) {
        return Err(ChainError::MalformedLegacyId);
    }
    let client_id = std::str::from_utf8(&raw[3..3 + len])
        .map_err(|_| ChainError::MalformedLegacyId)?
        .to_owned();
    Ok(Sibling::LegacyId {
        client_id,
        raw: raw.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hash::{DataHasher, HashAlgorithm};

    #[test]
    fn metadata_value_length_is_even() {
        for client_id in ["a", "ab", "abc", "service.worker"] {
            let meta = Metadata::new(client_id);
            assert_eq!(meta.value_bytes().len() % 2, 0, "client id {client_id:?}");
        }
        let meta = Metadata::build("gt", Some("m1"), Some(7), Some(1_398_866_256));
        assert_eq!(meta.value_bytes().len() % 2, 0);
    }

    #[test]
    fn metadata_round_trip() {
        let meta = Metadata::build("client", Some("host-1"), Some(3), None);
        let tlv = Tlv::raw(0x04, meta.value_bytes());
        let back = Metadata::from_tlv(&tlv).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn link_round_trip() {
        let sibling = DataHasher::digest(HashAlgorithm::Sha2_256, b"sibling");
        let link = Link::hash(Direction::Right, sibling).with_level_correction(4);
        let back = Link::from_tlv(&link.to_tlv()).unwrap();
        assert_eq!(back, link);
    }

    #[test]
    fn link_requires_exactly_one_sibling() {
        let empty = Tlv::nested(0x07, &[Tlv::uint(0x01, 1)]).unwrap();
        assert_eq!(Link::from_tlv(&empty), Err(ChainError::MissingSibling));

        let imprint = DataHasher::digest(HashAlgorithm::Sha2_256, b"x");
        let both = Tlv::nested(
            0x08,
            &[
                Tlv::raw(0x02, imprint.as_bytes()),
                Tlv::raw(0x04, Metadata::new("id").value_bytes()),
            ],
        )
        .unwrap();
        assert_eq!(Link::from_tlv(&both), Err(ChainError::ConflictingSibling));
    }

    #[test]
    fn legacy_id_decodes_embedded_string() {
        let mut raw = vec![0x03, 0x00, 0x04];
        raw.extend_from_slice(b"anon");
        raw.resize(29, 0);
        let link = Tlv::nested(0x07, &[Tlv::raw(0x03, raw)]).unwrap();
        match Link::from_tlv(&link).unwrap().sibling {
            Sibling::LegacyId { client_id, .. } => assert_eq!(client_id, "anon"),
            other => panic!("unexpected sibling {other:?}"),
        }
    }
}
