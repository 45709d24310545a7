//! The PDU v2 envelope: `pdu { header, payload…, mac }`, authenticated with
//! a keyed hash over the serialized PDU (digest bytes zeroed).

use log::debug;
use serde::Serialize;
use tlv::Tlv;

use crate::{NetError, ServiceEndpoint, ServiceError};

pub(crate) const TAG_HEADER: u16 = 0x01;
pub(crate) const TAG_PAYLOAD: u16 = 0x02;
pub(crate) const TAG_ERROR_PAYLOAD: u16 = 0x03;
pub(crate) const TAG_CONF_PAYLOAD: u16 = 0x04;
pub(crate) const TAG_ACK_PAYLOAD: u16 = 0x05;
pub(crate) const TAG_HMAC: u16 = 0x1f;

const TAG_HEADER_LOGIN_ID: u16 = 0x01;
const TAG_HEADER_INSTANCE_ID: u16 = 0x02;
const TAG_HEADER_MESSAGE_ID: u16 = 0x03;

pub(crate) const TAG_REQUEST_ID: u16 = 0x01;
pub(crate) const TAG_STATUS: u16 = 0x04;
pub(crate) const TAG_ERROR_MESSAGE: u16 = 0x05;

const TAG_CONF_MAX_LEVEL: u16 = 0x01;
const TAG_CONF_AGGR_ALGORITHM: u16 = 0x02;
const TAG_CONF_AGGR_PERIOD: u16 = 0x03;
const TAG_CONF_MAX_REQUESTS: u16 = 0x04;
const TAG_CONF_PARENT_URI: u16 = 0x10;
const TAG_CONF_CALENDAR_FIRST_TIME: u16 = 0x10;
const TAG_CONF_CALENDAR_LAST_TIME: u16 = 0x11;

const TAG_AGGREGATION_REQUEST_PDU: u16 = 0x220;
const TAG_AGGREGATION_RESPONSE_PDU: u16 = 0x221;
const TAG_EXTENSION_REQUEST_PDU: u16 = 0x320;
const TAG_EXTENSION_RESPONSE_PDU: u16 = 0x321;

const AGGREGATION_V1_PDU_TAGS: [u16; 2] = [0x200, 0x202];
const EXTENSION_V1_PDU_TAGS: [u16; 2] = [0x300, 0x302];

/// Responses above this size are rejected before parsing.
pub const MAX_RESPONSE_SIZE: usize = 0x10_0000;

/// Push configuration a service may attach to any response, or answer a
/// dedicated configuration request with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub max_level: Option<u64>,
    pub aggregation_algorithm: Option<u8>,
    pub aggregation_period: Option<u64>,
    pub max_requests: Option<u64>,
    pub parent_uris: Vec<String>,
    pub calendar_first_time: Option<u64>,
    pub calendar_last_time: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    Aggregator,
    Extender,
}

impl Service {
    fn request_tag(self) -> u16 {
        match self {
            Service::Aggregator => TAG_AGGREGATION_REQUEST_PDU,
            Service::Extender => TAG_EXTENSION_REQUEST_PDU,
        }
    }

    fn response_tag(self) -> u16 {
        match self {
            Service::Aggregator => TAG_AGGREGATION_RESPONSE_PDU,
            Service::Extender => TAG_EXTENSION_RESPONSE_PDU,
        }
    }

    fn v1_tags(self) -> &'static [u16] {
        match self {
            Service::Aggregator => &AGGREGATION_V1_PDU_TAGS,
            Service::Extender => &EXTENSION_V1_PDU_TAGS,
        }
    }

    fn pdu_v1_error(self) -> NetError {
        match self {
            Service::Aggregator => NetError::AggrPduV1Response,
            Service::Extender => NetError::ExtPduV1Response,
        }
    }

    /// Envelope elements the service may emit. Aggregators may acknowledge
    /// requests; extenders have no acknowledgment element, so one arriving
    /// as critical is an unknown critical element.
    fn known_envelope_tags(self) -> &'static [u16] {
        match self {
            Service::Aggregator => {
                &[TAG_HEADER, TAG_PAYLOAD, TAG_ERROR_PAYLOAD, TAG_CONF_PAYLOAD, TAG_ACK_PAYLOAD, TAG_HMAC]
            }
            Service::Extender => {
                &[TAG_HEADER, TAG_PAYLOAD, TAG_ERROR_PAYLOAD, TAG_CONF_PAYLOAD, TAG_HMAC]
            }
        }
    }

    fn parse_config(self, tlv: &Tlv) -> Result<ServiceConfig, NetError> {
        let children = tlv.children()?;
        let mut config = ServiceConfig::default();
        match self {
            Service::Aggregator => {
                config.max_level = tlv::unique(&children, TAG_CONF_MAX_LEVEL)?
                    .map(Tlv::as_u64)
                    .transpose()?;
                config.aggregation_algorithm = tlv::unique(&children, TAG_CONF_AGGR_ALGORITHM)?
                    .map(Tlv::as_u64)
                    .transpose()?
                    .map(|v| v as u8);
                config.aggregation_period = tlv::unique(&children, TAG_CONF_AGGR_PERIOD)?
                    .map(Tlv::as_u64)
                    .transpose()?;
                config.parent_uris = tlv::find_all(&children, TAG_CONF_PARENT_URI)
                    .map(|t| t.as_str().map(str::to_owned))
                    .collect::<Result<_, _>>()?;
            }
            Service::Extender => {
                config.calendar_first_time = tlv::unique(&children, TAG_CONF_CALENDAR_FIRST_TIME)?
                    .map(Tlv::as_u64)
                    .transpose()?;
                config.calendar_last_time = tlv::unique(&children, TAG_CONF_CALENDAR_LAST_TIME)?
                    .map(Tlv::as_u64)
                    .transpose()?;
            }
        }
        config.max_requests = tlv::unique(&children, TAG_CONF_MAX_REQUESTS)?
            .map(Tlv::as_u64)
            .transpose()?;
        Ok(config)
    }
}

/// Assembles a PDU with the header first and the MAC element last. The MAC
/// digest is computed over the serialized PDU with the digest bytes still
/// zero, then written into the tail in place.
fn seal_pdu(tag: u16, endpoint: &ServiceEndpoint, payloads: &[Tlv]) -> Result<Vec<u8>, NetError> {
    let header = Tlv::nested(
        TAG_HEADER,
        &[Tlv::string(TAG_HEADER_LOGIN_ID, &endpoint.login_id)],
    )?;
    let mut children = vec![header];
    children.extend_from_slice(payloads);

    let digest_len = endpoint.hmac_algorithm.digest_len();
    let mut mac_value = vec![0u8; 1 + digest_len];
    mac_value[0] = endpoint.hmac_algorithm.id();
    children.push(Tlv::raw(TAG_HMAC, mac_value));

    let mut bytes = Tlv::nested(tag, &children)?.serialize()?;
    let mac = hash::hmac(
        endpoint.hmac_algorithm,
        endpoint.password.as_bytes(),
        &bytes,
    )?;
    let tail = bytes.len() - digest_len;
    bytes[tail..].copy_from_slice(mac.digest());
    Ok(bytes)
}

pub(crate) fn build_request(
    service: Service,
    endpoint: &ServiceEndpoint,
    payloads: &[Tlv],
) -> Result<Vec<u8>, NetError> {
    seal_pdu(service.request_tag(), endpoint, payloads)
}

/// A response PDU with a valid MAC for the endpoint credentials; used by
/// the bundled mock responders.
pub(crate) fn build_response(
    service: Service,
    endpoint: &ServiceEndpoint,
    payloads: &[Tlv],
) -> Result<Vec<u8>, NetError> {
    seal_pdu(service.response_tag(), endpoint, payloads)
}

pub(crate) struct Envelope {
    pub payload: Option<Tlv>,
    pub config: Option<ServiceConfig>,
}

/// Authenticates and unpacks a response PDU. Enforces the envelope
/// ordering (header first, MAC last), the MAC algorithm agreement, the
/// unknown-element rules and the error-payload precedence.
pub(crate) fn parse_response(
    service: Service,
    endpoint: &ServiceEndpoint,
    bytes: &[u8],
) -> Result<Envelope, NetError> {
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(NetError::ResponseTooLarge(bytes.len()));
    }
    let pdu = Tlv::parse(bytes)?;
    if pdu.tag() != service.response_tag() {
        if service.v1_tags().contains(&pdu.tag()) {
            return Err(service.pdu_v1_error());
        }
        return Err(NetError::UnexpectedPduTag(pdu.tag()));
    }

    let children = pdu.children()?;
    if !children.first().is_some_and(|c| c.tag() == TAG_HEADER) {
        return Err(NetError::HeaderNotFirst);
    }
    let mac = match children.last() {
        Some(c) if c.tag() == TAG_HMAC => c,
        _ => return Err(NetError::HmacNotLast),
    };
    verify_mac(endpoint, bytes, mac)?;
    tlv::reject_unknown_critical(&children, service.known_envelope_tags())?;

    log_header(&children[0]);

    if let Some(error) = tlv::unique(&children, TAG_ERROR_PAYLOAD)? {
        let error_children = error.children()?;
        let status = tlv::require(&error_children, TAG_STATUS)?.as_u64()?;
        let message = error_message(&error_children)?;
        if status != 0 {
            return Err(ServiceError::from_status(status, message).into());
        }
    }

    let config = tlv::unique(&children, TAG_CONF_PAYLOAD)?
        .map(|t| service.parse_config(t))
        .transpose()?;

    let mut payloads = tlv::find_all(&children, TAG_PAYLOAD);
    let payload = payloads.next().cloned();
    if payloads.next().is_some() {
        return Err(NetError::MultipleResponsePayloads);
    }
    Ok(Envelope { payload, config })
}

/// Validates a response payload's status and request id pairing. An error
/// status wins over everything else in the payload.
pub(crate) fn check_payload_meta(
    children: &[Tlv],
    expected_request_id: u64,
) -> Result<(), NetError> {
    let status = tlv::unique(children, TAG_STATUS)?
        .map(Tlv::as_u64)
        .transpose()?
        .unwrap_or(0);
    if status != 0 {
        return Err(ServiceError::from_status(status, error_message(children)?).into());
    }
    let actual = tlv::require(children, TAG_REQUEST_ID)?.as_u64()?;
    if actual != expected_request_id {
        return Err(NetError::RequestIdMismatch {
            expected: expected_request_id,
            actual,
        });
    }
    Ok(())
}

fn error_message(children: &[Tlv]) -> Result<String, NetError> {
    Ok(tlv::unique(children, TAG_ERROR_MESSAGE)?
        .map(|t| t.as_str().map(str::to_owned))
        .transpose()?
        .unwrap_or_default())
}

fn verify_mac(endpoint: &ServiceEndpoint, bytes: &[u8], mac: &Tlv) -> Result<(), NetError> {
    let value = mac.as_bytes();
    let received = hash::Imprint::from_bytes(value)?;
    let actual = received.algorithm()?;
    if actual != endpoint.hmac_algorithm {
        return Err(NetError::HmacAlgorithmMismatch {
            expected: endpoint.hmac_algorithm,
            actual,
        });
    }
    // The MAC element is the last child, so its digest occupies the tail of
    // the PDU. Recompute over the PDU with those bytes zeroed.
    let digest_len = actual.digest_len();
    let mut mac_input = bytes.to_vec();
    let tail = mac_input.len() - digest_len;
    mac_input[tail..].fill(0);
    let computed = hash::hmac(actual, endpoint.password.as_bytes(), &mac_input)?;
    if computed.digest() != received.digest() {
        return Err(NetError::HmacMismatch);
    }
    Ok(())
}

fn log_header(header: &Tlv) {
    if let Ok(children) = header.children() {
        let instance = tlv::find(&children, TAG_HEADER_INSTANCE_ID).and_then(|t| t.as_u64().ok());
        let message = tlv::find(&children, TAG_HEADER_MESSAGE_ID).and_then(|t| t.as_u64().ok());
        debug!("response header: instance {instance:?}, message {message:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hash::HashAlgorithm;

    fn endpoint() -> ServiceEndpoint {
        ServiceEndpoint::new("ksi+test://aggr", "anon", "anon")
    }

    fn build_response(service: Service, endpoint: &ServiceEndpoint, payloads: &[Tlv]) -> Vec<u8> {
        super::build_response(service, endpoint, payloads).unwrap()
    }

    #[test]
    fn request_mac_covers_the_zeroed_pdu() {
        let ep = endpoint();
        let payload = Tlv::nested(TAG_PAYLOAD, &[Tlv::uint(TAG_REQUEST_ID, 1)]).unwrap();
        let bytes = build_request(Service::Aggregator, &ep, &[payload]).unwrap();
        let pdu = Tlv::parse(&bytes).unwrap();
        assert_eq!(pdu.tag(), 0x220);
        let children = pdu.children().unwrap();
        assert_eq!(children.first().unwrap().tag(), TAG_HEADER);
        let mac = children.last().unwrap();
        assert_eq!(mac.tag(), TAG_HMAC);

        let digest_len = HashAlgorithm::Sha2_256.digest_len();
        let mut zeroed = bytes.clone();
        let tail = zeroed.len() - digest_len;
        zeroed[tail..].fill(0);
        let expected = hash::hmac(HashAlgorithm::Sha2_256, b"anon", &zeroed).unwrap();
        assert_eq!(&mac.as_bytes()[1..], expected.digest());
    }

    #[test]
    fn response_round_trip() {
        let ep = endpoint();
        let payload = Tlv::nested(TAG_PAYLOAD, &[Tlv::uint(TAG_REQUEST_ID, 7)]).unwrap();
        let bytes = build_response(Service::Aggregator, &ep, &[payload]);
        let envelope = parse_response(Service::Aggregator, &ep, &bytes).unwrap();
        let children = envelope.payload.unwrap().children().unwrap();
        assert!(check_payload_meta(&children, 7).is_ok());
        assert!(matches!(
            check_payload_meta(&children, 8),
            Err(NetError::RequestIdMismatch { expected: 8, actual: 7 })
        ));
    }

    #[test]
    fn tampering_breaks_the_mac() {
        let ep = endpoint();
        let payload = Tlv::nested(TAG_PAYLOAD, &[Tlv::uint(TAG_REQUEST_ID, 7)]).unwrap();
        let mut bytes = build_response(Service::Aggregator, &ep, &[payload]);
        // Flip a bit inside the payload.
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;
        assert!(matches!(
            parse_response(Service::Aggregator, &ep, &bytes),
            Err(NetError::HmacMismatch)
        ));
    }

    #[test]
    fn configured_mac_algorithm_must_match() {
        let ep = endpoint();
        let strict = endpoint().with_hmac_algorithm(HashAlgorithm::Sha2_512);
        let bytes = build_response(Service::Aggregator, &ep, &[]);
        assert!(matches!(
            parse_response(Service::Aggregator, &strict, &bytes),
            Err(NetError::HmacAlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn error_payload_wins_over_response_payload() {
        let ep = endpoint();
        let payload = Tlv::nested(TAG_PAYLOAD, &[Tlv::uint(TAG_REQUEST_ID, 7)]).unwrap();
        let error = Tlv::nested(
            TAG_ERROR_PAYLOAD,
            &[Tlv::uint(TAG_STATUS, 0x101), Tlv::string(TAG_ERROR_MESSAGE, "rejected")],
        )
        .unwrap();
        let bytes = build_response(Service::Aggregator, &ep, &[payload, error]);
        assert!(matches!(
            parse_response(Service::Aggregator, &ep, &bytes),
            Err(NetError::Service(ServiceError::InvalidRequest(m))) if m == "rejected"
        ));
    }

    #[test]
    fn status_codes_map_to_distinct_errors() {
        let cases = [
            (0x101, "invalid request"),
            (0x102, "invalid payload"),
            (0x200, "auth"),
            (0x301, "timeout"),
        ];
        for (status, msg) in cases {
            let err = ServiceError::from_status(status, msg.to_owned());
            match status {
                0x101 => assert!(matches!(err, ServiceError::InvalidRequest(_))),
                0x102 => assert!(matches!(err, ServiceError::InvalidPayload(_))),
                0x200 => assert!(matches!(err, ServiceError::AuthenticationFailure(_))),
                0x301 => assert!(matches!(err, ServiceError::UpstreamTimeout(_))),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn acknowledgment_is_service_specific() {
        let ep = endpoint();
        let ack = Tlv::raw(TAG_ACK_PAYLOAD, vec![]);
        let payload = Tlv::nested(TAG_PAYLOAD, &[Tlv::uint(TAG_REQUEST_ID, 1)]).unwrap();
        let aggr =
            build_response(Service::Aggregator, &ep, &[payload.clone(), ack.clone()]);
        assert!(parse_response(Service::Aggregator, &ep, &aggr).is_ok());
        let ext = build_response(Service::Extender, &ep, &[payload, ack]);
        assert!(matches!(
            parse_response(Service::Extender, &ep, &ext),
            Err(NetError::Tlv(tlv::TlvError::UnknownCriticalElement { tag: 0x05 }))
        ));
    }
}
