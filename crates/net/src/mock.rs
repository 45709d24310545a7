//! Canned responder helpers: assemble authentic (or deliberately broken)
//! response PDUs for fixtures and tests, without a live service.

use tlv::Tlv;

use crate::pdu::{self, Service};
use crate::{NetError, ServiceEndpoint};

pub const TAG_HEADER: u16 = pdu::TAG_HEADER;
pub const TAG_PAYLOAD: u16 = pdu::TAG_PAYLOAD;
pub const TAG_ERROR_PAYLOAD: u16 = pdu::TAG_ERROR_PAYLOAD;
pub const TAG_CONF_PAYLOAD: u16 = pdu::TAG_CONF_PAYLOAD;
pub const TAG_ACK_PAYLOAD: u16 = pdu::TAG_ACK_PAYLOAD;
pub const TAG_HMAC: u16 = pdu::TAG_HMAC;
pub const TAG_REQUEST_ID: u16 = pdu::TAG_REQUEST_ID;
pub const TAG_STATUS: u16 = pdu::TAG_STATUS;
pub const TAG_ERROR_MESSAGE: u16 = pdu::TAG_ERROR_MESSAGE;
pub const TAG_CALENDAR_LAST_TIME: u16 = 0x10;

/// A sealed aggregation response: header first, MAC last, MAC valid for
/// the endpoint credentials.
pub fn aggregation_response(
    endpoint: &ServiceEndpoint,
    payloads: &[Tlv],
) -> Result<Vec<u8>, NetError> {
    pdu::build_response(Service::Aggregator, endpoint, payloads)
}

/// A sealed extension response.
pub fn extension_response(
    endpoint: &ServiceEndpoint,
    payloads: &[Tlv],
) -> Result<Vec<u8>, NetError> {
    pdu::build_response(Service::Extender, endpoint, payloads)
}

/// A v1-shaped aggregation response envelope, for exercising the PDU
/// version checks.
pub fn aggregation_response_v1() -> Vec<u8> {
    Tlv::nested(0x200, &[]).unwrap().serialize().unwrap()
}

/// A v1-shaped extension response envelope.
pub fn extension_response_v1() -> Vec<u8> {
    Tlv::nested(0x300, &[]).unwrap().serialize().unwrap()
}

/// An arbitrary envelope with the given children verbatim: no header or
/// MAC discipline, no sealing. For malformed-ordering fixtures.
pub fn unsealed_aggregation_response(children: &[Tlv]) -> Result<Vec<u8>, NetError> {
    Ok(Tlv::nested(0x221, children)?.serialize()?)
}

/// The header element a sealed response carries.
pub fn header(login_id: &str) -> Tlv {
    Tlv::nested(TAG_HEADER, &[Tlv::string(0x01, login_id)]).unwrap()
}

/// A MAC element with the right shape but an all-zero digest. Parsers
/// reject it unless ordering errors fire first.
pub fn zero_mac(endpoint: &ServiceEndpoint) -> Tlv {
    let mut value = vec![0u8; 1 + endpoint.hmac_algorithm.digest_len()];
    value[0] = endpoint.hmac_algorithm.id();
    Tlv::raw(TAG_HMAC, value)
}

/// A response payload carrying a request id and forwarded elements.
pub fn response_payload(request_id: u64, elements: &[Tlv]) -> Tlv {
    let mut children = vec![Tlv::uint(TAG_REQUEST_ID, request_id)];
    children.extend_from_slice(elements);
    Tlv::nested(TAG_PAYLOAD, &children).unwrap()
}

/// An error payload with the given status and message.
pub fn error_payload(status: u64, message: &str) -> Tlv {
    Tlv::nested(
        TAG_ERROR_PAYLOAD,
        &[Tlv::uint(TAG_STATUS, status), Tlv::string(TAG_ERROR_MESSAGE, message)],
    )
    .unwrap()
}
