//! Signer identity extraction from aggregation chain metadata.

use log::warn;

use crate::{AggregationHashChain, Sibling};

/// Collects the client identifiers recorded along the aggregation chains,
/// in chain and link order, joined with `.`. Legacy identifier blocks
/// contribute their embedded client id like proper metadata does.
pub fn signer_identity(chains: &[AggregationHashChain]) -> String {
    let mut ids: Vec<&str> = Vec::new();
    for chain in chains {
        for link in &chain.links {
            match &link.sibling {
                Sibling::Metadata(meta) => ids.push(meta.client_id()),
                Sibling::LegacyId { client_id, .. } => {
                    warn!("legacy client identifier in aggregation chain: {client_id}");
                    ids.push(client_id);
                }
                Sibling::Hash(_) => {}
            }
        }
    }
    ids.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, Link, Metadata};
    use hash::{DataHasher, HashAlgorithm};

    fn chain_with_links(links: Vec<Link>) -> AggregationHashChain {
        AggregationHashChain {
            aggregation_time: 1,
            chain_index: vec![1],
            input_data: None,
            input_hash: DataHasher::digest(HashAlgorithm::Sha2_256, b"in"),
            algorithm: HashAlgorithm::Sha2_256,
            links,
        }
    }

    #[test]
    fn identities_join_in_order() {
        let sibling = DataHasher::digest(HashAlgorithm::Sha2_256, b"s");
        let lower = chain_with_links(vec![
            Link {
                direction: Direction::Left,
                sibling: Sibling::Metadata(Metadata::new("client")),
                level_correction: 0,
            },
            Link::hash(Direction::Right, sibling.clone()),
        ]);
        let upper = chain_with_links(vec![Link {
            direction: Direction::Right,
            sibling: Sibling::Metadata(Metadata::new("gateway")),
            level_correction: 0,
        }]);
        assert_eq!(signer_identity(&[lower, upper]), "client.gateway");
    }

    #[test]
    fn hash_only_chains_yield_empty_identity() {
        let sibling = DataHasher::digest(HashAlgorithm::Sha2_256, b"s");
        let chain = chain_with_links(vec![Link::hash(Direction::Left, sibling)]);
        assert_eq!(signer_identity(&[chain]), "");
    }
}
