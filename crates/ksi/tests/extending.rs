//! Extending flow: calendar replacement, compatibility checks and
//! publication-record attachment.

mod common;

use std::sync::Arc;

use common::*;
use ksi::{CalendarHashChain, Context, Error, Imprint, MemoryTransport};
use net::{mock, NetError, ServiceError};
use pubfile::{CertificateRecord, PublicationsHeader};
use signature::{PublicationData, PublicationRecord, TAG_CALENDAR_CHAIN};
use tlv::Tlv;

const AGGREGATION_TIME: u64 = 4096;
const ORIGINAL_PUBLICATION: u64 = 4096;
const TARGET_PUBLICATION: u64 = 1_400_112_000;

fn base_signature_elements(input: &Imprint) -> Vec<Tlv> {
    signature_elements(input, 0, AGGREGATION_TIME, ORIGINAL_PUBLICATION)
}

fn round_root(input: &Imprint) -> Imprint {
    aggregation_chain(input, AGGREGATION_TIME, 0).fold(0).unwrap().0
}

fn extended_calendar(input: &Imprint) -> CalendarHashChain {
    calendar_chain(TARGET_PUBLICATION, AGGREGATION_TIME, round_root(input))
}

fn canned_extender(calendar: &CalendarHashChain, request_id: u64) -> Arc<MemoryTransport> {
    let transport = Arc::new(MemoryTransport::new());
    let response = mock::extension_response(
        &extender_endpoint(),
        &[mock::response_payload(request_id, &[calendar.to_tlv()])],
    )
    .unwrap();
    transport.insert(EXTENDER_URI, response);
    transport
}

fn load(ctx: &Context, elements: &[Tlv]) -> ksi::Signature {
    ctx.parse_signature(&signature_bytes(elements)).unwrap()
}

#[test]
fn extend_to_replaces_the_calendar_and_drops_the_auth_record() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);
    let replacement = extended_calendar(&input);

    let ctx = context(canned_extender(&replacement, 1));
    let sig = load(&ctx, &elements);
    let before = sig.serialize().unwrap();

    let extended = ctx.extend_to(&sig, TARGET_PUBLICATION).unwrap();

    // The expected result, assembled independently: the original
    // aggregation chain followed by the new calendar chain only.
    let expected = signature_bytes(&[elements[0].clone(), replacement.to_tlv()]);
    assert_eq!(extended.serialize().unwrap(), expected);
    assert!(extended.calendar_auth().is_none());
    assert_eq!(
        extended.calendar_chain().unwrap().publication_time,
        TARGET_PUBLICATION
    );
    // The original is untouched.
    assert_eq!(sig.serialize().unwrap(), before);
}

#[test]
fn extend_without_a_target_takes_the_head_of_the_calendar() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);
    let replacement = extended_calendar(&input);

    let ctx = context(canned_extender(&replacement, 1));
    let sig = load(&ctx, &elements);
    let extended = ctx.extend(&sig).unwrap();
    assert_eq!(
        extended.calendar_chain().unwrap().publication_time,
        TARGET_PUBLICATION
    );

    // The request payload carried no target publication time.
    let transport = Arc::new(MemoryTransport::new());
    let response = mock::extension_response(
        &extender_endpoint(),
        &[mock::response_payload(1, &[replacement.to_tlv()])],
    )
    .unwrap();
    transport.insert(EXTENDER_URI, response);
    let ctx = context(transport.clone());
    let sig = load(&ctx, &elements);
    ctx.extend(&sig).unwrap();
    let request = Tlv::parse(&transport.sent_body(0).unwrap()).unwrap();
    let payload = request
        .children()
        .unwrap()
        .into_iter()
        .find(|c| c.tag() == 0x02)
        .unwrap();
    let tags: Vec<u16> = payload.children().unwrap().iter().map(Tlv::tag).collect();
    assert!(!tags.contains(&0x03), "no publication time in {tags:?}");
}

#[test]
fn a_response_for_the_wrong_time_is_rejected() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);
    let replacement = extended_calendar(&input);

    let ctx = context(canned_extender(&replacement, 1));
    let sig = load(&ctx, &elements);
    assert!(matches!(
        ctx.extend_to(&sig, TARGET_PUBLICATION + 222),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn incompatible_right_links_abort_without_mutation() {
    let input = mock_imprint();
    let replacement = extended_calendar(&input);

    // Three broken originals: a differing, an extra and a missing right
    // link relative to what the extender pins.
    let wrong = {
        let mut calendar =
            calendar_chain(ORIGINAL_PUBLICATION, AGGREGATION_TIME, round_root(&input));
        calendar.links[0].1 = imprint("not-the-calendar-right-0");
        calendar
    };
    let extra = {
        let mut calendar =
            calendar_chain(ORIGINAL_PUBLICATION, AGGREGATION_TIME, round_root(&input));
        calendar
            .links
            .push((ksi::Direction::Right, imprint("calendar-right-1")));
        calendar
    };
    let missing = {
        let mut calendar =
            calendar_chain(ORIGINAL_PUBLICATION, AGGREGATION_TIME, round_root(&input));
        calendar.links.clear();
        calendar
    };

    for broken in [wrong, extra, missing] {
        let elements = vec![
            aggregation_chain(&input, AGGREGATION_TIME, 0).to_tlv(),
            broken.to_tlv(),
        ];
        let ctx = context(canned_extender(&replacement, 1));
        // Broken material is loaded without the consistency gate, the way a
        // forensic caller would.
        let sig = ctx.parse_signature_unverified(&signature_bytes(&elements)).unwrap();
        let before = sig.serialize().unwrap();
        assert!(matches!(
            ctx.extend_to(&sig, TARGET_PUBLICATION),
            Err(Error::IncompatibleHashChain)
        ));
        assert_eq!(sig.serialize().unwrap(), before);
    }
}

#[test]
fn a_signature_without_a_calendar_chain_gains_one() {
    let input = mock_imprint();
    let chain_tlv = aggregation_chain(&input, AGGREGATION_TIME, 0).to_tlv();
    let replacement = extended_calendar(&input);

    let ctx = context(canned_extender(&replacement, 1));
    let sig = ctx.parse_signature(&signature_bytes(&[chain_tlv.clone()])).unwrap();
    let extended = ctx.extend(&sig).unwrap();
    let expected = signature_bytes(&[chain_tlv, replacement.to_tlv()]);
    assert_eq!(extended.serialize().unwrap(), expected);
}

#[test]
fn extending_attaches_the_matching_publication_record() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);
    let replacement = extended_calendar(&input);

    let record = PublicationRecord::new(PublicationData::new(
        TARGET_PUBLICATION,
        replacement.fold(),
    ));
    let pubfile = pubfile::build_file(
        &PublicationsHeader {
            version: 1,
            creation_time: TARGET_PUBLICATION + 60,
            repository_uri: None,
        },
        &[CertificateRecord {
            id: vec![0xc0, 0xff, 0xee, 0x01],
            der: b"stub-certificate".to_vec(),
        }],
        &[record.clone()],
        b"stub-pkcs7",
    )
    .unwrap();

    let transport = canned_extender(&replacement, 1);
    transport.insert(PUBLICATIONS_URI, pubfile);
    let mut ctx = context(transport);
    ctx.set_publications_uri(PUBLICATIONS_URI);

    let sig = load(&ctx, &elements);
    let extended = ctx.extend_to(&sig, TARGET_PUBLICATION).unwrap();
    assert_eq!(extended.publication(), Some(&record));
    assert!(extended.calendar_auth().is_none());

    // Round-trips with the record in place.
    let reparsed = ctx.parse_signature(&extended.serialize().unwrap()).unwrap();
    assert_eq!(reparsed.publication(), Some(&record));
}

#[test]
fn extender_error_payload_and_version_checks() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);

    let transport = Arc::new(MemoryTransport::new());
    let response = mock::extension_response(
        &extender_endpoint(),
        &[mock::error_payload(0x102, "database gone")],
    )
    .unwrap();
    transport.insert(EXTENDER_URI, response);
    let ctx = context(transport);
    let sig = load(&ctx, &elements);
    assert!(matches!(
        ctx.extend(&sig),
        Err(Error::Net(NetError::Service(ServiceError::InvalidPayload(_))))
    ));

    let transport = Arc::new(MemoryTransport::new());
    transport.insert(EXTENDER_URI, mock::extension_response_v1());
    let ctx = context(transport);
    let sig = load(&ctx, &elements);
    assert!(matches!(
        ctx.extend(&sig),
        Err(Error::Net(NetError::ExtPduV1Response))
    ));
}

#[test]
fn extender_push_configuration_reaches_the_callback() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let input = mock_imprint();
    let elements = base_signature_elements(&input);
    let replacement = extended_calendar(&input);

    let conf = Tlv::nested(
        mock::TAG_CONF_PAYLOAD,
        &[Tlv::uint(0x04, 4), Tlv::uint(0x10, 1_398_866_256u64)],
    )
    .unwrap();
    let transport = Arc::new(MemoryTransport::new());
    let response = mock::extension_response(
        &extender_endpoint(),
        &[mock::response_payload(1, &[replacement.to_tlv()]), conf],
    )
    .unwrap();
    transport.insert(EXTENDER_URI, response);

    let mut ctx = context(transport);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    ctx.set_extender_conf_callback(Some(Box::new(move |config| {
        sink.borrow_mut().push(config.clone());
    })));

    let sig = load(&ctx, &elements);
    assert!(ctx.extend(&sig).is_ok());
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].max_requests, Some(4));
    assert_eq!(seen[0].calendar_first_time, Some(1_398_866_256));
}

#[test]
fn an_extended_signature_can_be_extended_again() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);
    let replacement = extended_calendar(&input);

    let ctx = context(canned_extender(&replacement, 1));
    let sig = load(&ctx, &elements);
    let once = ctx.extend_to(&sig, TARGET_PUBLICATION).unwrap();

    // A fresh context re-extends the already-extended signature.
    let ctx = context(canned_extender(&replacement, 1));
    let again = ctx.extend_to(&once, TARGET_PUBLICATION).unwrap();
    assert_eq!(again.serialize().unwrap(), once.serialize().unwrap());
}

#[test]
fn calendar_chain_element_is_required_in_the_response() {
    let input = mock_imprint();
    let elements = base_signature_elements(&input);

    let transport = Arc::new(MemoryTransport::new());
    let response = mock::extension_response(
        &extender_endpoint(),
        &[mock::response_payload(1, &[])],
    )
    .unwrap();
    transport.insert(EXTENDER_URI, response);
    let ctx = context(transport);
    let sig = load(&ctx, &elements);
    assert!(matches!(
        ctx.extend(&sig),
        Err(Error::Net(NetError::Tlv(tlv::TlvError::MissingElement {
            tag: TAG_CALENDAR_CHAIN
        })))
    ));
}
