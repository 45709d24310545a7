//! Aggregation hash chains: leaf-to-round-root reductions.

use hash::{DataHasher, HashAlgorithm, Imprint};
use tlv::Tlv;

use crate::link::{Link, TAG_LEFT_LINK, TAG_RIGHT_LINK};
use crate::ChainError;

pub(crate) const TAG_AGGREGATION_CHAIN: u16 = 0x801;

const TAG_AGGREGATION_TIME: u16 = 0x02;
const TAG_CHAIN_INDEX: u16 = 0x03;
const TAG_INPUT_DATA: u16 = 0x04;
const TAG_INPUT_HASH: u16 = 0x05;
const TAG_ALGORITHM: u16 = 0x06;

/// Maximum level a folding step may reach.
const MAX_LEVEL: u64 = 0xff;

/// One aggregation round: folds an input imprint up to the round root.
/// Links are ordered from the leaf toward the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationHashChain {
    pub aggregation_time: u64,
    pub chain_index: Vec<u64>,
    pub input_data: Option<Vec<u8>>,
    pub input_hash: Imprint,
    pub algorithm: HashAlgorithm,
    pub links: Vec<Link>,
}

impl AggregationHashChain {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, ChainError> {
        let children = tlv.children()?;
        tlv::reject_unknown_critical(
            &children,
            &[
                TAG_AGGREGATION_TIME,
                TAG_CHAIN_INDEX,
                TAG_INPUT_DATA,
                TAG_INPUT_HASH,
                TAG_ALGORITHM,
                TAG_LEFT_LINK,
                TAG_RIGHT_LINK,
            ],
        )?;
        let aggregation_time = tlv::require(&children, TAG_AGGREGATION_TIME)?.as_u64()?;
        let chain_index = tlv::find_all(&children, TAG_CHAIN_INDEX)
            .map(Tlv::as_u64)
            .collect::<Result<Vec<_>, _>>()?;
        let input_data = tlv::unique(&children, TAG_INPUT_DATA)?.map(|t| t.as_bytes().to_vec());
        let input_hash = Imprint::from_bytes(tlv::require(&children, TAG_INPUT_HASH)?.as_bytes())?;
        let algorithm_id = tlv::require(&children, TAG_ALGORITHM)?.as_u64()?;
        let algorithm = HashAlgorithm::from_id(algorithm_id as u8)?;
        // Links of both directions, kept in document order.
        let links = children
            .iter()
            .filter(|c| c.tag() == TAG_LEFT_LINK || c.tag() == TAG_RIGHT_LINK)
            .map(Link::from_tlv)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(AggregationHashChain {
            aggregation_time,
            chain_index,
            input_data,
            input_hash,
            algorithm,
            links,
        })
    }

    pub fn to_tlv(&self) -> Tlv {
        let mut children = vec![Tlv::uint(TAG_AGGREGATION_TIME, self.aggregation_time)];
        for index in &self.chain_index {
            children.push(Tlv::uint(TAG_CHAIN_INDEX, *index));
        }
        if let Some(data) = &self.input_data {
            children.push(Tlv::raw(TAG_INPUT_DATA, data.clone()));
        }
        children.push(Tlv::raw(TAG_INPUT_HASH, self.input_hash.as_bytes()));
        children.push(Tlv::uint(TAG_ALGORITHM, u64::from(self.algorithm.id())));
        for link in &self.links {
            children.push(link.to_tlv());
        }
        Tlv::nested(TAG_AGGREGATION_CHAIN, &children).expect("chain fields fit")
    }

    /// Folds the chain starting from `start_level`, producing the round root
    /// and the level it was reached at. Each step raises the level by one
    /// plus the link's correction; overflowing level 255 is an error.
    pub fn fold(&self, start_level: u64) -> Result<(Imprint, u64), ChainError> {
        let mut level = start_level;
        let mut current = self.input_hash.clone();
        for link in &self.links {
            level = level + 1 + u64::from(link.level_correction);
            if level > MAX_LEVEL {
                return Err(ChainError::LevelOverflow);
            }
            let mut hasher = DataHasher::open(self.algorithm);
            match link.direction {
                crate::Direction::Left => {
                    hasher.add(current.as_bytes()).add(link.sibling.as_fold_bytes());
                }
                crate::Direction::Right => {
                    hasher.add(link.sibling.as_fold_bytes()).add(current.as_bytes());
                }
            }
            hasher.add(&[level as u8]);
            current = hasher.close();
        }
        Ok((current, level))
    }
}
