//! Calendar hash chains: round-root to calendar-root reductions.

use hash::{DataHasher, HashAlgorithm, Imprint};
use tlv::Tlv;

use crate::link::{Direction, TAG_LEFT_LINK, TAG_RIGHT_LINK};
use crate::ChainError;

pub(crate) const TAG_CALENDAR_CHAIN: u16 = 0x802;

const TAG_PUBLICATION_TIME: u16 = 0x01;
const TAG_AGGREGATION_TIME: u16 = 0x02;
const TAG_INPUT_HASH: u16 = 0x05;

/// Marker byte closing every calendar folding step.
const CALENDAR_LEVEL_BYTE: u8 = 0xff;

/// The chain from a round root up to the calendar root published at
/// `publication_time`. Links carry sibling imprints only; the folding
/// algorithm is fixed to SHA2-256 with no level corrections, and the
/// left/right shape of the chain encodes the aggregation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarHashChain {
    pub publication_time: u64,
    pub aggregation_time: Option<u64>,
    pub input_hash: Imprint,
    pub links: Vec<(Direction, Imprint)>,
}

impl CalendarHashChain {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, ChainError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_PUBLICATION_TIME,
                TAG_AGGREGATION_TIME,
                TAG_INPUT_HASH,
                TAG_LEFT_LINK,
                TAG_RIGHT_LINK,
            ],
        )?;
        let publication_time = tlv::require(&children, TAG_PUBLICATION_TIME)?.as_u64()?;
        let aggregation_time = tlv::unique(&children, TAG_AGGREGATION_TIME)?
            .map(Tlv::as_u64)
            .transpose()?;
        let input_hash = Imprint::from_bytes(tlv::require(&children, TAG_INPUT_HASH)?.as_bytes())?;
        let mut links = Vec::new();
        for child in &children {
            if let Some(direction) = Direction::from_tag(child.tag()) {
                links.push((direction, Imprint::from_bytes(child.as_bytes())?));
            }
        }
        Ok(CalendarHashChain {
            publication_time,
            aggregation_time,
            input_hash,
            links,
        })
    }

    pub fn to_tlv(&self) -> Tlv {
        let mut children = vec![Tlv::uint(TAG_PUBLICATION_TIME, self.publication_time)];
        if let Some(t) = self.aggregation_time {
            children.push(Tlv::uint(TAG_AGGREGATION_TIME, t));
        }
        children.push(Tlv::raw(TAG_INPUT_HASH, self.input_hash.as_bytes()));
        for (direction, sibling) in &self.links {
            children.push(Tlv::raw(direction.tag(), sibling.as_bytes()));
        }
        Tlv::nested(TAG_CALENDAR_CHAIN, &children).expect("calendar fields fit")
    }

    /// Folds the chain to the calendar root.
    pub fn fold(&self) -> Imprint {
        let mut current = self.input_hash.clone();
        for (direction, sibling) in &self.links {
            let mut hasher = DataHasher::open(HashAlgorithm::Sha2_256);
            match direction {
                Direction::Left => hasher.add(current.as_bytes()).add(sibling.as_bytes()),
                Direction::Right => hasher.add(sibling.as_bytes()).add(current.as_bytes()),
            };
            hasher.add(&[CALENDAR_LEVEL_BYTE]);
            current = hasher.close();
        }
        current
    }

    /// The aggregation time the signature claims, falling back to the
    /// publication time when the chain does not record one.
    pub fn aggregation_time(&self) -> u64 {
        self.aggregation_time.unwrap_or(self.publication_time)
    }

    /// Derives the aggregation time implied by the link directions. Walking
    /// the chain from the root down, each right link consumes the highest
    /// set bit of the remaining time value and contributes it to the
    /// aggregation time; each left link descends into the subtree below
    /// that bit. A residue means the shape is inconsistent.
    pub fn derived_aggregation_time(&self) -> Result<u64, ChainError> {
        let mut remaining = self.publication_time;
        let mut derived = 0u64;
        for (direction, _) in self.links.iter().rev() {
            if remaining == 0 {
                return Err(ChainError::MalformedCalendarShape);
            }
            let high_bit = 1u64 << (63 - remaining.leading_zeros());
            match direction {
                Direction::Left => remaining = high_bit - 1,
                Direction::Right => {
                    derived += high_bit;
                    remaining -= high_bit;
                }
            }
        }
        if remaining != 0 {
            return Err(ChainError::MalformedCalendarShape);
        }
        Ok(derived)
    }

    /// Sibling imprints of the right links, leaf to root. These are the
    /// links whose values are pinned by the published root.
    pub fn right_link_imprints(&self) -> Vec<&Imprint> {
        self.links
            .iter()
            .filter(|(direction, _)| *direction == Direction::Right)
            .map(|(_, imprint)| imprint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imprint(seed: &[u8]) -> Imprint {
        DataHasher::digest(HashAlgorithm::Sha2_256, seed)
    }

    #[test]
    fn tlv_round_trip() {
        let chain = CalendarHashChain {
            publication_time: 1_400_112_000,
            aggregation_time: Some(1_398_866_256),
            input_hash: imprint(b"root"),
            links: vec![
                (Direction::Right, imprint(b"r0")),
                (Direction::Left, imprint(b"l0")),
            ],
        };
        let back = CalendarHashChain::from_tlv(&chain.to_tlv()).unwrap();
        assert_eq!(back, chain);
    }

    #[test]
    fn fold_uses_sha256_and_the_calendar_marker() {
        let chain = CalendarHashChain {
            publication_time: 4096,
            aggregation_time: None,
            input_hash: imprint(b"in"),
            links: vec![(Direction::Right, imprint(b"sib"))],
        };
        let expected = {
            let mut h = DataHasher::open(HashAlgorithm::Sha2_256);
            h.add(imprint(b"sib").as_bytes())
                .add(imprint(b"in").as_bytes())
                .add(&[0xff]);
            h.close()
        };
        assert_eq!(chain.fold(), expected);
    }

    #[test]
    fn derived_time_single_right_link() {
        // publication time is a power of two: one right link consumes it all.
        let chain = CalendarHashChain {
            publication_time: 4096,
            aggregation_time: Some(4096),
            input_hash: imprint(b"in"),
            links: vec![(Direction::Right, imprint(b"s"))],
        };
        assert_eq!(chain.derived_aggregation_time().unwrap(), 4096);
    }

    #[test]
    fn derived_time_mixed_shape() {
        // publication 4112 = 4096 + 16, aggregation 4096. Walking from the
        // root: the right link consumes the 4096 bit, then left links
        // descend through residues 16 -> 15 -> 7 -> 3 -> 1 -> 0.
        let links: Vec<(Direction, Imprint)> = [
            Direction::Left,
            Direction::Left,
            Direction::Left,
            Direction::Left,
            Direction::Left,
            Direction::Right,
        ]
        .into_iter()
        .map(|d| (d, imprint(b"x")))
        .collect();
        let chain = CalendarHashChain {
            publication_time: 4112,
            aggregation_time: Some(4096),
            input_hash: imprint(b"in"),
            links,
        };
        assert_eq!(chain.derived_aggregation_time().unwrap(), 4096);
    }

    #[test]
    fn inconsistent_shape_is_rejected() {
        let chain = CalendarHashChain {
            publication_time: 6,
            aggregation_time: Some(6),
            input_hash: imprint(b"in"),
            links: vec![(Direction::Right, imprint(b"a"))],
        };
        // One right link consumes the 4-bit; remaining 2 is a residue.
        assert_eq!(
            chain.derived_aggregation_time(),
            Err(ChainError::MalformedCalendarShape)
        );
    }
}
