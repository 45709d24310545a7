//! The signing client: builds aggregation requests and unpacks the
//! signature elements out of the response payload.

use log::debug;
use tlv::Tlv;

use hash::Imprint;
use signature::{SIGNATURE_ELEMENT_TAGS, TAG_SIGNATURE};

use crate::pdu::{self, Service, ServiceConfig};
use crate::{NetError, ServiceEndpoint, Transport};

const TAG_REQUEST_HASH: u16 = 0x02;
const TAG_REQUEST_LEVEL: u16 = 0x03;

pub struct SignatureResponse {
    /// The assembled signature container element, children forwarded byte
    /// for byte from the response payload.
    pub signature: Tlv,
    pub config: Option<ServiceConfig>,
}

pub struct AggregatorClient<'a> {
    pub transport: &'a dyn Transport,
    pub endpoint: &'a ServiceEndpoint,
}

impl AggregatorClient<'_> {
    /// Requests aggregation of `hash` submitted at `level`.
    pub fn request_signature(
        &self,
        request_id: u64,
        hash: &Imprint,
        level: u64,
    ) -> Result<SignatureResponse, NetError> {
        let mut fields = vec![
            Tlv::uint(pdu::TAG_REQUEST_ID, request_id),
            Tlv::raw(TAG_REQUEST_HASH, hash.as_bytes()),
        ];
        if level > 0 {
            fields.push(Tlv::uint(TAG_REQUEST_LEVEL, level));
        }
        let payload = Tlv::nested(pdu::TAG_PAYLOAD, &fields)?;
        let request = pdu::build_request(Service::Aggregator, self.endpoint, &[payload])?;
        debug!("aggregation request {request_id}: {} bytes", request.len());

        let response = self.transport.fetch(&self.endpoint.uri, Some(&request))?;
        let envelope = pdu::parse_response(Service::Aggregator, self.endpoint, &response)?;
        let payload = envelope.payload.ok_or(NetError::MissingResponsePayload)?;
        let children = payload.children()?;
        pdu::check_payload_meta(&children, request_id)?;

        let mut known = vec![pdu::TAG_REQUEST_ID, pdu::TAG_STATUS, pdu::TAG_ERROR_MESSAGE];
        known.extend_from_slice(&SIGNATURE_ELEMENT_TAGS);
        tlv::reject_unknown_critical(&children, &known)?;

        let elements: Vec<Tlv> = children
            .into_iter()
            .filter(|c| SIGNATURE_ELEMENT_TAGS.contains(&c.tag()))
            .collect();
        let signature = Tlv::nested(TAG_SIGNATURE, &elements)?;
        Ok(SignatureResponse {
            signature,
            config: envelope.config,
        })
    }

    /// Asks the aggregator for its current configuration.
    pub fn request_config(&self) -> Result<ServiceConfig, NetError> {
        let conf = Tlv::raw(pdu::TAG_CONF_PAYLOAD, vec![]);
        let request = pdu::build_request(Service::Aggregator, self.endpoint, &[conf])?;
        let response = self.transport.fetch(&self.endpoint.uri, Some(&request))?;
        let envelope = pdu::parse_response(Service::Aggregator, self.endpoint, &response)?;
        envelope.config.ok_or(NetError::MissingResponsePayload)
    }
}
