//! The extending client: trades an aggregation time for the calendar hash
//! chain connecting it to a later publication.

use log::debug;
use tlv::Tlv;

use hashchain::CalendarHashChain;
use signature::TAG_CALENDAR_CHAIN;

use crate::pdu::{self, Service, ServiceConfig};
use crate::{NetError, ServiceEndpoint, Transport};

const TAG_REQ_AGGREGATION_TIME: u16 = 0x02;
const TAG_REQ_PUBLICATION_TIME: u16 = 0x03;
const TAG_CALENDAR_LAST_TIME: u16 = 0x10;

pub struct CalendarResponse {
    pub calendar: CalendarHashChain,
    /// Head of the calendar at the time the extender answered.
    pub calendar_last_time: Option<u64>,
    pub config: Option<ServiceConfig>,
}

pub struct ExtenderClient<'a> {
    pub transport: &'a dyn Transport,
    pub endpoint: &'a ServiceEndpoint,
}

impl ExtenderClient<'_> {
    /// Requests the calendar chain from `aggregation_time` up to
    /// `publication_time`, or to the head of the calendar when no target
    /// time is given.
    pub fn request_calendar(
        &self,
        request_id: u64,
        aggregation_time: u64,
        publication_time: Option<u64>,
    ) -> Result<CalendarResponse, NetError> {
        let mut fields = vec![
            Tlv::uint(pdu::TAG_REQUEST_ID, request_id),
            Tlv::uint(TAG_REQ_AGGREGATION_TIME, aggregation_time),
        ];
        if let Some(publication_time) = publication_time {
            fields.push(Tlv::uint(TAG_REQ_PUBLICATION_TIME, publication_time));
        }
        let payload = Tlv::nested(pdu::TAG_PAYLOAD, &fields)?;
        let request = pdu::build_request(Service::Extender, self.endpoint, &[payload])?;
        debug!(
            "extension request {request_id}: aggregation {aggregation_time}, target {publication_time:?}"
        );

        let response = self.transport.fetch(&self.endpoint.uri, Some(&request))?;
        let envelope = pdu::parse_response(Service::Extender, self.endpoint, &response)?;
        let payload = envelope.payload.ok_or(NetError::MissingResponsePayload)?;
        let children = payload.children()?;
        pdu::check_payload_meta(&children, request_id)?;
        tlv::reject_unknown_critical(
            &children,
            &[
                pdu::TAG_REQUEST_ID,
                pdu::TAG_STATUS,
                pdu::TAG_ERROR_MESSAGE,
                TAG_CALENDAR_LAST_TIME,
                TAG_CALENDAR_CHAIN,
            ],
        )?;
        let calendar =
            CalendarHashChain::from_tlv(tlv::require(&children, TAG_CALENDAR_CHAIN)?)?;
        let calendar_last_time = tlv::unique(&children, TAG_CALENDAR_LAST_TIME)?
            .map(Tlv::as_u64)
            .transpose()?;
        Ok(CalendarResponse {
            calendar,
            calendar_last_time,
            config: envelope.config,
        })
    }

    /// Asks the extender for its current configuration.
    pub fn request_config(&self) -> Result<ServiceConfig, NetError> {
        let conf = Tlv::raw(pdu::TAG_CONF_PAYLOAD, vec![]);
        let request = pdu::build_request(Service::Extender, self.endpoint, &[conf])?;
        let response = self.transport.fetch(&self.endpoint.uri, Some(&request))?;
        let envelope = pdu::parse_response(Service::Extender, self.endpoint, &response)?;
        envelope.config.ok_or(NetError::MissingResponsePayload)
    }
}
