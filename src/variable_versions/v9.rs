//! # Netflow V9
//!
//! References:
//! - <https://www.ietf.org/rfc/rfc3954.txt>
//! - <https://www.cisco.com/en/US/technologies/tk648/tk362/technologies_white_paper09186a00800a3db9.html>

use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::event::{FieldValue, FlowEvent};
use crate::time::{header_timestamp, unix_micros_to_iso};
use crate::variable_versions::cache::TemplateKey;
use crate::variable_versions::store_template;
use crate::variable_versions::template::{CompiledField, Decode};

use log::warn;
use nom_derive::{Nom, Parse};
use serde::Serialize;

use std::net::SocketAddr;

pub const VERSION: u16 = 9;

const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 1;
const MIN_DATA_FLOWSET_ID: u16 = 256;
const FLOWSET_HEADER_BYTES: usize = 4;
/// Up to 3 bytes of trailing padding are tolerated in a data flowset.
const MAX_TRAILING_PADDING: usize = 3;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// The version of NetFlow records exported in this packet; for Version 9,
    /// this value is 9
    pub version: u16,
    /// Number of FlowSet records (both template and data) contained within
    /// this packet
    pub count: u16,
    /// Time in milliseconds since this device was first booted
    pub sys_up_time: u32,
    /// Seconds since 0000 Coordinated Universal Time (UTC) 1970
    pub unix_secs: u32,
    /// Incremental sequence counter of all export packets sent by this
    /// export device
    pub flow_seq_num: u32,
    /// A 32-bit value that guarantees uniqueness for all flows exported from
    /// a particular device; collectors should use the combination of the
    /// source IP address plus the Source ID field to separate exporters
    pub source_id: u32,
}

/// Decodes a V9 PDU: learns templates, applies cached templates to data
/// flowsets and returns one event per decoded flow record.
pub(crate) fn decode(
    decoder: &Decoder,
    input: &[u8],
    peer: SocketAddr,
) -> Result<Vec<FlowEvent>, DecodeError> {
    let (after_header, header) =
        Header::parse_be(input).map_err(|_| DecodeError::Truncated("netflow v9 header"))?;

    let mut remaining = after_header;
    let mut events = Vec::new();
    while remaining.len() >= FLOWSET_HEADER_BYTES {
        let flowset_id = u16::from_be_bytes([remaining[0], remaining[1]]);
        let flowset_length = usize::from(u16::from_be_bytes([remaining[2], remaining[3]]));
        if flowset_length < FLOWSET_HEADER_BYTES {
            return Err(DecodeError::BadLength {
                context: "netflow v9 flowset",
                length: flowset_length,
            });
        }
        if flowset_length > remaining.len() {
            return Err(DecodeError::Truncated("netflow v9 flowset"));
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
            id => warn!("reserved netflow v9 flowset id {id} from {peer}, skipping"),
        }
    }
    Ok(events)
}

/// A template flowset may carry several templates back to back.
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
        if body.len() < field_count * 4 {
            return Err(DecodeError::Truncated("netflow v9 template fields"));
        }

        // One unresolvable field discards this template only; the framing is
        // intact, so the remaining templates still parse.
        let mut fields = Some(Vec::with_capacity(field_count));
        for spec in body[..field_count * 4].chunks_exact(4) {
            let field_type = u16::from_be_bytes([spec[0], spec[1]]);
            let field_length = u16::from_be_bytes([spec[2], spec[3]]);
            if let Some(resolved) = fields.as_mut() {
                match decoder.v9_catalog.resolve(field_type, field_length) {
                    Some(field) => resolved.push(field),
                    None => fields = None,
                }
            }
        }
        body = &body[field_count * 4..];

        let key = TemplateKey::new(header.source_id, template_id, peer);
        store_template(decoder, key, fields, "netflow v9");
    }
    Ok(())
}

/// Options templates declare scope fields (named from a fixed enumeration)
/// and option fields (resolved through the catalog). Once compiled they are
/// indistinguishable from regular templates and share the same cache.
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
        let scope_length = usize::from(u16::from_be_bytes([body[2], body[3]]));
        let options_length = usize::from(u16::from_be_bytes([body[4], body[5]]));
        body = &body[6..];

        let scope_bytes = (scope_length / 4) * 4;
        let option_bytes = (options_length / 4) * 4;
        if body.len() < scope_bytes + option_bytes {
            return Err(DecodeError::Truncated("netflow v9 options template fields"));
        }

        let mut fields = Some(Vec::with_capacity((scope_bytes + option_bytes) / 4));
        for spec in body[..scope_bytes].chunks_exact(4) {
            let field_type = u16::from_be_bytes([spec[0], spec[1]]);
            let field_length = u16::from_be_bytes([spec[2], spec[3]]);
            if let Some(resolved) = fields.as_mut() {
                match resolve_scope_field(field_type, field_length) {
                    Some(field) => resolved.push(field),
                    None => fields = None,
                }
            }
        }
        for spec in body[scope_bytes..scope_bytes + option_bytes].chunks_exact(4) {
            let field_type = u16::from_be_bytes([spec[0], spec[1]]);
            let field_length = u16::from_be_bytes([spec[2], spec[3]]);
            if let Some(resolved) = fields.as_mut() {
                match decoder.v9_catalog.resolve(field_type, field_length) {
                    Some(field) => resolved.push(field),
                    None => fields = None,
                }
            }
        }
        body = &body[scope_bytes + option_bytes..];

        let key = TemplateKey::new(header.source_id, template_id, peer);
        store_template(decoder, key, fields, "netflow v9 options");
    }
    Ok(())
}

/// Scope field types come from a small fixed enumeration rather than the
/// field catalog; the value is always an unsigned integer of the declared
/// length.
fn resolve_scope_field(field_type: u16, field_length: u16) -> Option<CompiledField> {
    let name = match field_type {
        1 => "scope_system",
        2 => "scope_interface",
        3 => "scope_line_card",
        4 => "scope_netflow_cache",
        5 => "scope_template",
        _ => {
            warn!("unknown netflow v9 scope field type {field_type}, rejecting template");
            return None;
        }
    };
    let width = usize::from(field_length);
    if (1..=8).contains(&width) {
        Some(CompiledField::new(name, Decode::UInt(width)))
    } else {
        warn!("netflow v9 scope field {name} has unsupported width {width}, rejecting template");
        None
    }
}

fn decode_data_flowset(
    decoder: &Decoder,
    body: &[u8],
    flowset_id: u16,
    header: &Header,
    peer: SocketAddr,
    events: &mut Vec<FlowEvent>,
) {
    let key = TemplateKey::new(header.source_id, flowset_id, peer);
    let Some(template) = decoder.templates.get(&key) else {
        warn!(
            "no netflow v9 template {flowset_id} for source id {} from {peer}, skipping flowset",
            header.source_id
        );
        decoder.metrics.record_missing_template();
        return;
    };

    let width = template.width();
    if width > body.len() || body.len() % width > MAX_TRAILING_PADDING {
        warn!(
            "netflow v9 flowset {flowset_id} from {peer} carries {} payload bytes, template width is {width}, skipping flowset",
            body.len()
        );
        decoder.metrics.record_length_mismatch();
        return;
    }

    for record in body.chunks_exact(width) {
        let mut event = FlowEvent::new(
            header_timestamp(header.unix_secs, 0),
            peer.ip(),
            &decoder.container,
        );
        event.insert("version", FieldValue::UInt(header.version.into()));
        event.insert("flow_seq_num", FieldValue::UInt(header.flow_seq_num.into()));
        event.insert("flowset_id", FieldValue::UInt(flowset_id.into()));
        for (name, value) in template.decode_record(record) {
            let value = match value {
                FieldValue::UInt(v) if name.ends_with("_switched") => {
                    FieldValue::Str(switched_to_iso(header, v))
                }
                other => other,
            };
            event.insert(name, value);
        }
        events.push(event);
    }
}

/// V9 has no nanoseconds field in the header, and the historical collector
/// formula yields exactly 1_000_000 microseconds on millisecond boundaries.
/// Both quirks are kept; `unix_micros_to_iso` carries the overflow into the
/// seconds when rendering.
fn switched_to_iso(header: &Header, value: u64) -> String {
    let millis = i64::from(header.sys_up_time) - value as i64;
    let seconds = i64::from(header.unix_secs) - millis.div_euclid(1000);
    let micros = 1_000_000 - millis.rem_euclid(1000);
    unix_micros_to_iso(seconds, micros)
}
