//! # IPFix
//!
//! References:
//! - <https://datatracker.ietf.org/doc/html/rfc7011>
//! - <https://www.iana.org/assignments/ipfix/ipfix.xhtml>

use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::event::{FieldValue, FlowEvent};
use crate::time::{header_timestamp, unix_micros_to_iso, unix_secs_to_iso};
use crate::variable_versions::cache::TemplateKey;
use crate::variable_versions::store_template;
use crate::variable_versions::template::CompiledField;

use log::warn;
use nom_derive::{Nom, Parse};
use serde::Serialize;

use std::net::SocketAddr;

pub const VERSION: u16 = 10;

const TEMPLATE_FLOWSET_ID: u16 = 2;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 3;
const MIN_DATA_FLOWSET_ID: u16 = 256;
const HEADER_BYTES: usize = 16;
const FLOWSET_HEADER_BYTES: usize = 4;
/// High bit of a field specifier type: an enterprise number follows.
const ENTERPRISE_BIT: u16 = 0x8000;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// Version of the Flow Record format exported in this message;
    /// 0x000a for IPFIX
    pub version: u16,
    /// Total length of the IPFIX message in octets, including this header
    pub length: u16,
    /// Seconds since 0000 UTC Jan 1, 1970, at which the message left the
    /// exporter
    pub export_time: u32,
    /// Incremental sequence counter of all IPFIX Data Records sent from the
    /// current Observation Domain; Template and Options Template Records do
    /// not increase it
    pub sequence_number: u32,
    /// Identifier of the Observation Domain, locally unique to the exporting
    /// process; collectors must scope template ids by it
    pub observation_domain_id: u32,
}

/// Decodes an IPFIX message. Framing matches V9 apart from the flowset ids,
/// the enterprise-capable field specifiers and the absence of a record count
/// in data flowsets.
pub(crate) fn decode(
    decoder: &Decoder,
    input: &[u8],
    peer: SocketAddr,
) -> Result<Vec<FlowEvent>, DecodeError> {
    let (_, header) =
        Header::parse_be(input).map_err(|_| DecodeError::Truncated("ipfix header"))?;

    let total = usize::from(header.length);
    if total < HEADER_BYTES {
        return Err(DecodeError::BadLength {
            context: "ipfix message",
            length: total,
        });
    }
    if total > input.len() {
        return Err(DecodeError::Truncated("ipfix message body"));
    }

    let mut remaining = &input[HEADER_BYTES..total];
    let mut events = Vec::new();
    while remaining.len() >= FLOWSET_HEADER_BYTES {
        let flowset_id = u16::from_be_bytes([remaining[0], remaining[1]]);
        let flowset_length = usize::from(u16::from_be_bytes([remaining[2], remaining[3]]));
        if flowset_length < FLOWSET_HEADER_BYTES {
            return Err(DecodeError::BadLength {
                context: "ipfix flowset",
                length: flowset_length,
            });
        }
        if flowset_length > remaining.len() {
            return Err(DecodeError::Truncated("ipfix flowset"));
        }
        let body = &remaining[FLOWSET_HEADER_BYTES..flowset_length];
        remaining = &remaining[flowset_length..];

        match flowset_id {
            TEMPLATE_FLOWSET_ID => parse_template_flowset(decoder, body, &header, peer)?,
            OPTIONS_TEMPLATE_FLOWSET_ID => {
                parse_options_template_flowset(decoder, body, &header, peer)?
            }
            id if id >= MIN_DATA_FLOWSET_ID => {
                decode_data_flowset(decoder, body, id, &header, peer, &mut events)
            }
            id => warn!("reserved ipfix flowset id {id} from {peer}, skipping"),
        }
    }
    Ok(events)
}

/// One `(enterprise, type, length)` field specifier. The enterprise number
/// is only present on the wire when the type's high bit is set; enterprise 0
/// (IANA) is implied otherwise.
fn parse_field_specifier(body: &[u8]) -> Result<(usize, u32, u16, u16), DecodeError> {
    if body.len() < 4 {
        return Err(DecodeError::Truncated("ipfix field specifier"));
    }
    let raw_type = u16::from_be_bytes([body[0], body[1]]);
    let field_length = u16::from_be_bytes([body[2], body[3]]);
    if raw_type & ENTERPRISE_BIT == 0 {
        return Ok((4, 0, raw_type, field_length));
    }
    if body.len() < 8 {
        return Err(DecodeError::Truncated("ipfix enterprise number"));
    }
    let enterprise = u32::from_be_bytes([body[4], body[5], body[6], body[7]]);
    Ok((8, enterprise, raw_type & !ENTERPRISE_BIT, field_length))
}

fn parse_template_flowset(
    decoder: &Decoder,
    mut body: &[u8],
    header: &Header,
    peer: SocketAddr,
) -> Result<(), DecodeError> {
    while body.len() >= 4 {
        let template_id = u16::from_be_bytes([body[0], body[1]]);
        if template_id < MIN_DATA_FLOWSET_ID {
            // Template ids start at 256; anything lower is flowset padding.
            break;
        }
        let field_count = usize::from(u16::from_be_bytes([body[2], body[3]]));
        body = &body[4..];

        let mut fields = Some(Vec::with_capacity(field_count));
        for _ in 0..field_count {
            let (consumed, enterprise, field_type, field_length) = parse_field_specifier(body)?;
            body = &body[consumed..];
            if let Some(resolved) = fields.as_mut() {
                match decoder
                    .ipfix_catalog
                    .resolve(enterprise, field_type, field_length)
                {
                    Some(field) => resolved.push(field),
                    None => fields = None,
                }
            }
        }

        let key = TemplateKey::new(header.observation_domain_id, template_id, peer);
        store_template(decoder, key, fields, "ipfix");
    }
    Ok(())
}

/// IPFIX options templates declare scope and option fields with the same
/// enterprise-capable encoding; both resolve uniformly through the catalog
/// (unlike the V9 scope enumeration).
fn parse_options_template_flowset(
    decoder: &Decoder,
    mut body: &[u8],
    header: &Header,
    peer: SocketAddr,
) -> Result<(), DecodeError> {
    while body.len() >= 6 {
        let template_id = u16::from_be_bytes([body[0], body[1]]);
        if template_id < MIN_DATA_FLOWSET_ID {
            break;
        }
        let field_count = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let scope_field_count = usize::from(u16::from_be_bytes([body[4], body[5]]));
        body = &body[6..];

        // Scope fields are counted within field_count.
        let total = scope_field_count + field_count.saturating_sub(scope_field_count);
        let mut fields: Option<Vec<CompiledField>> = Some(Vec::with_capacity(total));
        for _ in 0..total {
            let (consumed, enterprise, field_type, field_length) = parse_field_specifier(body)?;
            body = &body[consumed..];
            if let Some(resolved) = fields.as_mut() {
                match decoder
                    .ipfix_catalog
                    .resolve(enterprise, field_type, field_length)
                {
                    Some(field) => resolved.push(field),
                    None => fields = None,
                }
            }
        }

        let key = TemplateKey::new(header.observation_domain_id, template_id, peer);
        store_template(decoder, key, fields, "ipfix options");
    }
    Ok(())
}

fn decode_data_flowset(
    decoder: &Decoder,
    body: &[u8],
    flowset_id: u16,
    header: &Header,
    peer: SocketAddr,
    events: &mut Vec<FlowEvent>,
) {
    let key = TemplateKey::new(header.observation_domain_id, flowset_id, peer);
    let Some(template) = decoder.templates.get(&key) else {
        warn!(
            "no ipfix template {flowset_id} for observation domain {} from {peer}, skipping flowset",
            header.observation_domain_id
        );
        decoder.metrics.record_missing_template();
        return;
    };

    let width = template.width();
    if width > body.len() {
        warn!(
            "ipfix flowset {flowset_id} from {peer} carries {} payload bytes, template width is {width}, skipping flowset",
            body.len()
        );
        decoder.metrics.record_length_mismatch();
        return;
    }

    // No record count on the wire: records run to the end of the flowset,
    // trailing bytes shorter than one record are padding.
    for record in body.chunks_exact(width) {
        let mut event = FlowEvent::new(
            header_timestamp(header.export_time, 0),
            peer.ip(),
            &decoder.container,
        );
        event.insert("version", FieldValue::UInt(header.version.into()));
        for (name, value) in template.decode_record(record) {
            event.insert(name, postprocess(name, value));
        }
        events.push(event);
    }
}

/// Timestamp information elements become ISO-8601 strings; everything else
/// is copied verbatim.
fn postprocess(name: &str, value: FieldValue) -> FieldValue {
    let FieldValue::UInt(v) = value else {
        return value;
    };
    match name {
        "flowStartSeconds" | "flowEndSeconds" => FieldValue::Str(unix_secs_to_iso(v)),
        "flowStartMilliseconds" | "flowEndMilliseconds" => FieldValue::Str(unix_micros_to_iso(
            (v / 1_000) as i64,
            ((v % 1_000) * 1_000) as i64,
        )),
        "flowStartMicroseconds" | "flowEndMicroseconds" => {
            FieldValue::Str(unix_micros_to_iso((v / 1_000_000) as i64, (v % 1_000_000) as i64))
        }
        "flowStartNanoseconds" | "flowEndNanoseconds" => FieldValue::Str(unix_micros_to_iso(
            (v / 1_000_000_000) as i64,
            ((v % 1_000_000_000) / 1_000) as i64,
        )),
        _ => FieldValue::UInt(v),
    }
}
