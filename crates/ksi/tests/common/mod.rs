//! Programmatic fixtures: consistent signatures, calendar chains of a given
//! shape, and sealed service responses served through the in-memory
//! transport.

#![allow(dead_code)]

use std::sync::Arc;

use ksi::{
    CalendarHashChain, Context, DataHasher, Direction, HashAlgorithm, Imprint, Link,
    MemoryTransport, ServiceEndpoint,
};
use signature::{
    CalendarAuthRecord, PublicationData, SignatureData, TAG_CALENDAR_AUTH_RECORD, TAG_SIGNATURE,
};
use tlv::Tlv;

pub const AGGREGATOR_URI: &str = "ksi+tcp://aggregator.test";
pub const EXTENDER_URI: &str = "ksi+tcp://extender.test";
pub const PUBLICATIONS_URI: &str = "http://publications.test/publications.bin";

pub const TEST_USER: &str = "anon";
pub const TEST_PASS: &str = "anon";

pub fn imprint(seed: &str) -> Imprint {
    DataHasher::digest(HashAlgorithm::Sha2_256, seed.as_bytes())
}

/// The document imprint used across the exchanges.
pub fn mock_imprint() -> Imprint {
    Imprint::from_hex("0111a700b0c8066c47ecba05ed37bc14dcadb238552d86c659342d1d7e87b8772d").unwrap()
}

pub fn aggregator_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new(AGGREGATOR_URI, TEST_USER, TEST_PASS)
}

pub fn extender_endpoint() -> ServiceEndpoint {
    ServiceEndpoint::new(EXTENDER_URI, TEST_USER, TEST_PASS)
}

/// A context wired to the given in-memory transport, with both services
/// configured under the shared test credentials.
pub fn context(transport: Arc<MemoryTransport>) -> Context {
    let mut ctx = Context::with_transport(transport);
    ctx.set_aggregator(AGGREGATOR_URI, TEST_USER, TEST_PASS);
    ctx.set_extender(EXTENDER_URI, TEST_USER, TEST_PASS);
    ctx
}

/// Link directions (leaf to root) of the calendar chain that connects an
/// aggregation round at `aggregation_time` to the root published at
/// `publication_time`. Walking from the root down, a right link is taken
/// whenever the high bit of the remaining value belongs to the aggregation
/// time.
pub fn calendar_directions(publication_time: u64, aggregation_time: u64) -> Vec<Direction> {
    assert!(aggregation_time >= 1 && aggregation_time <= publication_time);
    let mut remaining = publication_time;
    let mut reached = 0u64;
    let mut from_root = Vec::new();
    while remaining > 0 {
        let high_bit = 1u64 << (63 - remaining.leading_zeros());
        if reached + high_bit <= aggregation_time {
            reached += high_bit;
            remaining -= high_bit;
            from_root.push(Direction::Right);
        } else {
            remaining = high_bit - 1;
            from_root.push(Direction::Left);
        }
    }
    assert_eq!(reached, aggregation_time);
    from_root.reverse();
    from_root
}

/// A calendar chain of the proper shape. Sibling values are derived from
/// the link's role, so the right-link sequence for a fixed aggregation
/// time is the same whatever the publication time.
pub fn calendar_chain(
    publication_time: u64,
    aggregation_time: u64,
    input_hash: Imprint,
) -> CalendarHashChain {
    let mut rights = 0usize;
    let mut lefts = 0usize;
    let links = calendar_directions(publication_time, aggregation_time)
        .into_iter()
        .map(|direction| {
            let sibling = match direction {
                Direction::Right => {
                    rights += 1;
                    imprint(&format!("calendar-right-{}", rights - 1))
                }
                Direction::Left => {
                    lefts += 1;
                    imprint(&format!("calendar-left-{}", lefts - 1))
                }
            };
            (direction, sibling)
        })
        .collect();
    CalendarHashChain {
        publication_time,
        aggregation_time: Some(aggregation_time),
        input_hash,
        links,
    }
}

pub fn aggregation_chain(
    input: &Imprint,
    aggregation_time: u64,
    first_level_correction: u8,
) -> ksi::AggregationHashChain {
    ksi::AggregationHashChain {
        aggregation_time,
        chain_index: vec![3],
        input_data: None,
        input_hash: input.clone(),
        algorithm: HashAlgorithm::Sha2_256,
        links: vec![
            Link::hash(Direction::Left, imprint("aggr-sibling-a"))
                .with_level_correction(first_level_correction),
            Link::hash(Direction::Right, imprint("aggr-sibling-b")),
        ],
    }
}

pub fn calendar_auth(calendar: &CalendarHashChain) -> CalendarAuthRecord {
    CalendarAuthRecord {
        publication_data: PublicationData::new(calendar.publication_time, calendar.fold()),
        signature_algorithm: "1.2.840.113549.1.1.11".to_owned(),
        signature_data: SignatureData {
            value: vec![0x5a; 64],
            certificate: None,
            certificate_id: Some(vec![0xc0, 0xff, 0xee, 0x01]),
            cert_repository_uri: None,
        },
    }
}

/// The elements of a consistent signature: aggregation chain, calendar
/// chain and calendar authentication record.
pub fn signature_elements(
    input: &Imprint,
    first_level_correction: u8,
    aggregation_time: u64,
    publication_time: u64,
) -> Vec<Tlv> {
    let chain = aggregation_chain(input, aggregation_time, first_level_correction);
    let (round_root, _) = chain.fold(0).unwrap();
    let calendar = calendar_chain(publication_time, aggregation_time, round_root);
    let auth = calendar_auth(&calendar);
    vec![
        chain.to_tlv(),
        calendar.to_tlv(),
        auth.to_tlv(TAG_CALENDAR_AUTH_RECORD),
    ]
}

pub fn signature_bytes(elements: &[Tlv]) -> Vec<u8> {
    Tlv::nested(TAG_SIGNATURE, elements).unwrap().serialize().unwrap()
}
