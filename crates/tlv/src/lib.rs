//! Type-length-value codec used for wire PDUs, stored signatures and the
//! publications file.
//!
//! Elements carry a 13-bit tag and two flag bits. An element is *critical*
//! unless the non-critical bit is set; the forward bit marks elements a
//! relaying parser should keep even when it does not understand them. Two
//! header encodings exist: a short form (tag ≤ 0x1f, length ≤ 0xff, two
//! header bytes) and a long form (16-bit tag word with flag bits, 16-bit
//! big-endian length). Serialization emits the short form whenever it fits,
//! except for elements that were read off the wire in long form, which keep
//! their original header so round-trips stay byte-stable.

use thiserror::Error;

/// Largest representable tag (13 bits).
pub const MAX_TAG: u16 = 0x1fff;
/// Largest representable value length (long-form length field).
pub const MAX_LEN: usize = 0xffff;

const FLAG_LONG: u8 = 0x80;
const FLAG_NON_CRITICAL: u8 = 0x40;
const FLAG_FORWARD: u8 = 0x20;
const TAG_HIGH_MASK: u8 = 0x1f;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TlvError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("element 0x{tag:02x} length {declared} exceeds remaining {remaining} bytes")]
    LengthMismatch {
        tag: u16,
        declared: usize,
        remaining: usize,
    },
    #[error("{0} trailing bytes after element")]
    TrailingBytes(usize),
    #[error("tag 0x{0:04x} out of range")]
    TagOutOfRange(u16),
    #[error("value of {0} bytes does not fit a length field")]
    ValueTooLong(usize),
    #[error("integer payload of {0} bytes exceeds 8")]
    IntTooLong(usize),
    #[error("string payload is missing the terminating NUL")]
    MissingNulTerminator,
    #[error("string payload contains an interior NUL")]
    InteriorNul,
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("unknown critical element 0x{tag:02x}")]
    UnknownCriticalElement { tag: u16 },
    #[error("unexpected element 0x{actual:02x}, expected 0x{expected:02x}")]
    UnexpectedTag { expected: u16, actual: u16 },
    #[error("missing mandatory element 0x{tag:02x}")]
    MissingElement { tag: u16 },
    #[error("multiple occurrences of element 0x{tag:02x}")]
    DuplicateElement { tag: u16 },
}

/// A single decoded element. The payload is kept as raw bytes; nested
/// children are decoded on demand so a parent's bytes stay authoritative.
#[derive(Clone, PartialEq, Eq)]
pub struct Tlv {
    tag: u16,
    non_critical: bool,
    forward: bool,
    long_form: bool,
    value: Vec<u8>,
}

impl std::fmt::Debug for Tlv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tlv(0x{:02x}{}{}, {} bytes)",
            self.tag,
            if self.non_critical { ",NC" } else { "" },
            if self.forward { ",F" } else { "" },
            self.value.len()
        )
    }
}

impl Tlv {
    /// New element with a raw byte payload.
    pub fn raw(tag: u16, value: impl Into<Vec<u8>>) -> Self {
        debug_assert!(tag <= MAX_TAG);
        Tlv {
            tag,
            non_critical: false,
            forward: false,
            long_form: false,
            value: value.into(),
        }
    }

    /// New element holding a big-endian unsigned integer in its minimal
    /// encoding. Zero encodes as an empty payload.
    pub fn uint(tag: u16, v: u64) -> Self {
        let bytes = v.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Tlv::raw(tag, &bytes[skip..])
    }

    /// New element holding a NUL-terminated UTF-8 string.
    pub fn string(tag: u16, s: &str) -> Self {
        debug_assert!(!s.as_bytes().contains(&0));
        let mut value = Vec::with_capacity(s.len() + 1);
        value.extend_from_slice(s.as_bytes());
        value.push(0);
        Tlv::raw(tag, value)
    }

    /// New element whose payload is the concatenation of serialized children.
    pub fn nested(tag: u16, children: &[Tlv]) -> Result<Self, TlvError> {
        let mut value = Vec::new();
        for child in children {
            child.write(&mut value)?;
        }
        Ok(Tlv::raw(tag, value))
    }

    pub fn with_flags(mut self, non_critical: bool, forward: bool) -> Self {
        self.non_critical = non_critical;
        self.forward = forward;
        self
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn is_non_critical(&self) -> bool {
        self.non_critical
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Parses exactly one element; trailing bytes are an error.
    pub fn parse(bytes: &[u8]) -> Result<Self, TlvError> {
        let mut cursor = bytes;
        let tlv = Self::read_one(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(TlvError::TrailingBytes(cursor.len()));
        }
        Ok(tlv)
    }

    /// Parses one element from the front of the cursor, advancing it.
    pub fn read_one(data: &mut &[u8]) -> Result<Self, TlvError> {
        if data.len() < 2 {
            return Err(TlvError::UnexpectedEof);
        }
        let b0 = data[0];
        let non_critical = b0 & FLAG_NON_CRITICAL != 0;
        let forward = b0 & FLAG_FORWARD != 0;
        let long_form = b0 & FLAG_LONG != 0;
        let (tag, len, header) = if long_form {
            if data.len() < 4 {
                return Err(TlvError::UnexpectedEof);
            }
            let tag = u16::from(b0 & TAG_HIGH_MASK) << 8 | u16::from(data[1]);
            let len = usize::from(data[2]) << 8 | usize::from(data[3]);
            (tag, len, 4)
        } else {
            (u16::from(b0 & TAG_HIGH_MASK), usize::from(data[1]), 2)
        };
        if data.len() - header < len {
            return Err(TlvError::LengthMismatch {
                tag,
                declared: len,
                remaining: data.len() - header,
            });
        }
        let value = data[header..header + len].to_vec();
        *data = &data[header + len..];
        Ok(Tlv {
            tag,
            non_critical,
            forward,
            long_form,
            value,
        })
    }

    /// Serialized size of this element alone (header plus payload).
    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.value.len()
    }

    fn header_len(&self) -> usize {
        if self.long_form || self.tag > u16::from(TAG_HIGH_MASK) || self.value.len() > 0xff {
            4
        } else {
            2
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, TlvError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write(&mut out)?;
        Ok(out)
    }

    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), TlvError> {
        if self.tag > MAX_TAG {
            return Err(TlvError::TagOutOfRange(self.tag));
        }
        if self.value.len() > MAX_LEN {
            return Err(TlvError::ValueTooLong(self.value.len()));
        }
        let mut flags = 0u8;
        if self.non_critical {
            flags |= FLAG_NON_CRITICAL;
        }
        if self.forward {
            flags |= FLAG_FORWARD;
        }
        if self.header_len() == 4 {
            out.push(FLAG_LONG | flags | (self.tag >> 8) as u8);
            out.push((self.tag & 0xff) as u8);
            out.push((self.value.len() >> 8) as u8);
            out.push((self.value.len() & 0xff) as u8);
        } else {
            out.push(flags | self.tag as u8);
            out.push(self.value.len() as u8);
        }
        out.extend_from_slice(&self.value);
        Ok(())
    }

    /// Raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Payload reinterpreted as a big-endian unsigned integer. An empty
    /// payload decodes as zero.
    pub fn as_u64(&self) -> Result<u64, TlvError> {
        if self.value.len() > 8 {
            return Err(TlvError::IntTooLong(self.value.len()));
        }
        Ok(self.value.iter().fold(0u64, |acc, b| acc << 8 | u64::from(*b)))
    }

    /// Payload reinterpreted as a NUL-terminated UTF-8 string.
    pub fn as_str(&self) -> Result<&str, TlvError> {
        match self.value.split_last() {
            Some((0, body)) => {
                if body.contains(&0) {
                    return Err(TlvError::InteriorNul);
                }
                std::str::from_utf8(body).map_err(|_| TlvError::InvalidUtf8)
            }
            _ => Err(TlvError::MissingNulTerminator),
        }
    }

    /// Decodes the payload as a sequence of nested elements, in document
    /// order. The payload must be consumed exactly.
    pub fn children(&self) -> Result<Vec<Tlv>, TlvError> {
        let mut cursor = &self.value[..];
        let mut out = Vec::new();
        while !cursor.is_empty() {
            out.push(Self::read_one(&mut cursor)?);
        }
        Ok(out)
    }

    /// Byte ranges of the nested children inside the payload.
    fn child_ranges(&self) -> Result<Vec<(usize, usize, u16)>, TlvError> {
        let mut ranges = Vec::new();
        let mut cursor = &self.value[..];
        while !cursor.is_empty() {
            let start = self.value.len() - cursor.len();
            let child = Self::read_one(&mut cursor)?;
            let end = self.value.len() - cursor.len();
            ranges.push((start, end, child.tag));
        }
        Ok(ranges)
    }

    /// Replaces the first child with the given tag, splicing the new bytes
    /// in place so surrounding siblings stay byte-identical. Returns whether
    /// a child was replaced.
    pub fn replace_child(&mut self, tag: u16, new: &Tlv) -> Result<bool, TlvError> {
        for (start, end, child_tag) in self.child_ranges()? {
            if child_tag == tag {
                let encoded = new.serialize()?;
                self.value.splice(start..end, encoded);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Removes every child with the given tag; returns the number removed.
    pub fn remove_children(&mut self, tag: u16) -> Result<usize, TlvError> {
        let mut removed = 0;
        loop {
            let range = self
                .child_ranges()?
                .into_iter()
                .find(|(_, _, t)| *t == tag);
            match range {
                Some((start, end, _)) => {
                    self.value.drain(start..end);
                    removed += 1;
                }
                None => return Ok(removed),
            }
        }
    }

    /// Appends a child after the existing ones.
    pub fn push_child(&mut self, new: &Tlv) -> Result<(), TlvError> {
        new.write(&mut self.value)
    }
}

/// First child with the given tag.
pub fn find<'a>(children: &'a [Tlv], tag: u16) -> Option<&'a Tlv> {
    children.iter().find(|c| c.tag() == tag)
}

/// All children with the given tag, in document order.
pub fn find_all<'a>(children: &'a [Tlv], tag: u16) -> impl Iterator<Item = &'a Tlv> {
    children.iter().filter(move |c| c.tag() == tag)
}

/// First child with the given tag, or `MissingElement`.
pub fn require<'a>(children: &'a [Tlv], tag: u16) -> Result<&'a Tlv, TlvError> {
    find(children, tag).ok_or(TlvError::MissingElement { tag })
}

/// First child with the given tag, rejecting duplicates.
pub fn unique<'a>(children: &'a [Tlv], tag: u16) -> Result<Option<&'a Tlv>, TlvError> {
    let mut it = find_all(children, tag);
    let first = it.next();
    if it.next().is_some() {
        return Err(TlvError::DuplicateElement { tag });
    }
    Ok(first)
}

/// Rejects critical elements outside the known tag set. Non-critical
/// unknowns pass; what happens to them (kept, dropped or forwarded) is the
/// caller's policy.
pub fn reject_unknown_critical(children: &[Tlv], known: &[u16]) -> Result<(), TlvError> {
    for child in children {
        if !known.contains(&child.tag()) && !child.is_non_critical() {
            return Err(TlvError::UnknownCriticalElement { tag: child.tag() });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trip() {
        let tlv = Tlv::raw(0x05, vec![1, 2, 3]);
        let bytes = tlv.serialize().unwrap();
        assert_eq!(bytes, vec![0x05, 0x03, 1, 2, 3]);
        assert_eq!(Tlv::parse(&bytes).unwrap(), tlv);
    }

    #[test]
    fn long_form_for_large_tags() {
        let tlv = Tlv::raw(0x801, vec![0xaa]);
        let bytes = tlv.serialize().unwrap();
        assert_eq!(bytes, vec![0x88, 0x01, 0x00, 0x01, 0xaa]);
        assert_eq!(Tlv::parse(&bytes).unwrap(), tlv);
    }

    #[test]
    fn long_form_for_large_values() {
        let tlv = Tlv::raw(0x01, vec![0u8; 0x100]);
        let bytes = tlv.serialize().unwrap();
        assert_eq!(&bytes[..4], &[0x80, 0x01, 0x01, 0x00]);
        assert_eq!(Tlv::parse(&bytes).unwrap(), tlv);
    }

    #[test]
    fn wire_long_form_is_preserved() {
        // A small element encoded in long form keeps that header.
        let bytes = [0x80, 0x05, 0x00, 0x01, 0x42];
        let tlv = Tlv::parse(&bytes).unwrap();
        assert_eq!(tlv.serialize().unwrap(), bytes);
    }

    #[test]
    fn flags_round_trip() {
        let tlv = Tlv::raw(0x1f, vec![]).with_flags(true, true);
        let bytes = tlv.serialize().unwrap();
        assert_eq!(bytes[0], 0x40 | 0x20 | 0x1f);
        let back = Tlv::parse(&bytes).unwrap();
        assert!(back.is_non_critical());
        assert!(back.is_forward());
    }

    #[test]
    fn integers_use_minimal_encoding() {
        assert_eq!(Tlv::uint(0x01, 0).as_bytes(), &[] as &[u8]);
        assert_eq!(Tlv::uint(0x01, 0x05).as_bytes(), &[0x05]);
        assert_eq!(Tlv::uint(0x01, 0x1234).as_bytes(), &[0x12, 0x34]);
        assert_eq!(Tlv::uint(0x01, u64::MAX).as_bytes(), &[0xff; 8]);
        assert_eq!(Tlv::uint(0x01, 1398866256).as_u64().unwrap(), 1398866256);
    }

    #[test]
    fn oversized_integer_is_rejected() {
        let tlv = Tlv::raw(0x01, vec![1; 9]);
        assert_eq!(tlv.as_u64(), Err(TlvError::IntTooLong(9)));
    }

    #[test]
    fn strings_are_nul_terminated() {
        let tlv = Tlv::string(0x02, "anon");
        assert_eq!(tlv.as_bytes(), b"anon\0");
        assert_eq!(tlv.as_str().unwrap(), "anon");
        assert_eq!(
            Tlv::raw(0x02, b"anon".to_vec()).as_str(),
            Err(TlvError::MissingNulTerminator)
        );
        assert_eq!(
            Tlv::raw(0x02, b"an\0on\0".to_vec()).as_str(),
            Err(TlvError::InteriorNul)
        );
    }

    #[test]
    fn nested_children_round_trip() {
        let parent = Tlv::nested(
            0x800,
            &[Tlv::uint(0x01, 7), Tlv::string(0x02, "id"), Tlv::raw(0x03, vec![9])],
        )
        .unwrap();
        let children = parent.children().unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].as_u64().unwrap(), 7);
        assert_eq!(children[1].as_str().unwrap(), "id");
        let bytes = parent.serialize().unwrap();
        assert_eq!(Tlv::parse(&bytes).unwrap(), parent);
    }

    #[test]
    fn declared_length_must_match() {
        // Header says 5 bytes, only 3 present.
        let err = Tlv::parse(&[0x01, 0x05, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, TlvError::LengthMismatch { declared: 5, .. }));
        // One complete element plus garbage.
        let err = Tlv::parse(&[0x01, 0x01, 0xaa, 0xbb]).unwrap_err();
        assert_eq!(err, TlvError::TrailingBytes(1));
    }

    #[test]
    fn replace_child_keeps_siblings_byte_stable() {
        let mut parent = Tlv::nested(
            0x800,
            &[
                Tlv::raw(0x01, vec![1]),
                Tlv::raw(0x02, vec![2, 2]),
                Tlv::raw(0x03, vec![3]),
            ],
        )
        .unwrap();
        let before = parent.serialize().unwrap();
        assert!(parent.replace_child(0x02, &Tlv::raw(0x02, vec![0xee; 4])).unwrap());
        let after = parent.serialize().unwrap();
        // Prefix (header adjusted for length) and the third child survive.
        assert_eq!(&after[after.len() - 3..], &before[before.len() - 3..]);
        let children = parent.children().unwrap();
        assert_eq!(children[1].as_bytes(), &[0xee; 4]);
    }

    #[test]
    fn remove_and_push_children() {
        let mut parent = Tlv::nested(
            0x800,
            &[Tlv::raw(0x01, vec![1]), Tlv::raw(0x02, vec![2]), Tlv::raw(0x02, vec![3])],
        )
        .unwrap();
        assert_eq!(parent.remove_children(0x02).unwrap(), 2);
        parent.push_child(&Tlv::raw(0x04, vec![4])).unwrap();
        let tags: Vec<u16> = parent.children().unwrap().iter().map(Tlv::tag).collect();
        assert_eq!(tags, vec![0x01, 0x04]);
    }

    #[test]
    fn unknown_critical_elements_are_rejected() {
        let children = vec![
            Tlv::raw(0x01, vec![]),
            Tlv::raw(0x0e, vec![]).with_flags(true, false),
            Tlv::raw(0x0f, vec![]),
        ];
        assert!(reject_unknown_critical(&children, &[0x01, 0x0f]).is_ok());
        assert_eq!(
            reject_unknown_critical(&children, &[0x01]),
            Err(TlvError::UnknownCriticalElement { tag: 0x0f })
        );
    }
}
