//! # Netflow V5
//!
//! References:
//! - <https://www.cisco.com/en/US/technologies/tk648/tk362/technologies_white_paper09186a00800a3db9.html>

use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::event::{FieldValue, FlowEvent};
use crate::time::{header_timestamp, unix_micros_to_iso};

use nom::number::complete::be_u32;
use nom_derive::{Nom, Parse};
use serde::Serialize;

use std::net::{Ipv4Addr, SocketAddr};

pub const VERSION: u16 = 5;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// NetFlow export format version number
    pub version: u16,
    /// Number of flows exported in this packet (1-30)
    pub count: u16,
    /// Current time in milliseconds since the export device booted
    pub sys_up_time: u32,
    /// Current count of seconds since 0000 UTC 1970
    pub unix_secs: u32,
    /// Residual nanoseconds since 0000 UTC 1970
    pub unix_nsecs: u32,
    /// Sequence counter of total flows seen
    pub flow_seq_num: u32,
    /// Type of flow-switching engine
    pub engine_type: u8,
    /// Slot number of the flow-switching engine
    pub engine_id: u8,
    /// First two bits hold the sampling mode; remaining 14 bits hold the
    /// value of the sampling interval
    pub sampling: u16,
}

impl Header {
    pub fn sampling_algorithm(&self) -> u8 {
        (self.sampling >> 14) as u8
    }

    pub fn sampling_interval(&self) -> u16 {
        self.sampling & 0x3FFF
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Nom)]
pub struct FlowRecord {
    /// Source IP address
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    pub ipv4_src_addr: Ipv4Addr,
    /// Destination IP address
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    pub ipv4_dst_addr: Ipv4Addr,
    /// IP address of next hop router
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    pub ipv4_next_hop: Ipv4Addr,
    /// SNMP index of input interface
    pub input_snmp: u16,
    /// SNMP index of output interface
    pub output_snmp: u16,
    /// Packets in the flow
    pub in_pkts: u32,
    /// Total number of Layer 3 bytes in the packets of the flow
    pub in_bytes: u32,
    /// SysUptime in milliseconds at start of flow
    pub first_switched: u32,
    /// SysUptime in milliseconds when the last packet of the flow was received
    pub last_switched: u32,
    /// TCP/UDP source port number or equivalent
    pub l4_src_port: u16,
    /// TCP/UDP destination port number or equivalent
    pub l4_dst_port: u16,
    /// Unused (zero) byte
    pad1: u8,
    /// Cumulative OR of TCP flags
    pub tcp_flags: u8,
    /// IP protocol type (for example, TCP = 6; UDP = 17)
    pub protocol: u8,
    /// IP type of service (ToS)
    pub src_tos: u8,
    /// Autonomous system number of the source, either origin or peer
    pub src_as: u16,
    /// Autonomous system number of the destination, either origin or peer
    pub dst_as: u16,
    /// Source address prefix mask bits
    pub src_mask: u8,
    /// Destination address prefix mask bits
    pub dst_mask: u8,
    /// Unused (zero) bytes
    pad2: u16,
}

impl FlowRecord {
    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("ipv4_src_addr", FieldValue::Ip4Addr(self.ipv4_src_addr)),
            ("ipv4_dst_addr", FieldValue::Ip4Addr(self.ipv4_dst_addr)),
            ("ipv4_next_hop", FieldValue::Ip4Addr(self.ipv4_next_hop)),
            ("input_snmp", FieldValue::UInt(self.input_snmp.into())),
            ("output_snmp", FieldValue::UInt(self.output_snmp.into())),
            ("in_pkts", FieldValue::UInt(self.in_pkts.into())),
            ("in_bytes", FieldValue::UInt(self.in_bytes.into())),
            ("first_switched", FieldValue::UInt(self.first_switched.into())),
            ("last_switched", FieldValue::UInt(self.last_switched.into())),
            ("l4_src_port", FieldValue::UInt(self.l4_src_port.into())),
            ("l4_dst_port", FieldValue::UInt(self.l4_dst_port.into())),
            ("tcp_flags", FieldValue::UInt(self.tcp_flags.into())),
            ("protocol", FieldValue::UInt(self.protocol.into())),
            ("src_tos", FieldValue::UInt(self.src_tos.into())),
            ("src_as", FieldValue::UInt(self.src_as.into())),
            ("dst_as", FieldValue::UInt(self.dst_as.into())),
            ("src_mask", FieldValue::UInt(self.src_mask.into())),
            ("dst_mask", FieldValue::UInt(self.dst_mask.into())),
        ]
    }
}

/// Decodes a V5 PDU into one event per flow record.
pub(crate) fn decode(
    decoder: &Decoder,
    input: &[u8],
    peer: SocketAddr,
) -> Result<Vec<FlowEvent>, DecodeError> {
    let (mut remaining, header) =
        Header::parse_be(input).map_err(|_| DecodeError::Truncated("netflow v5 header"))?;

    let timestamp = header_timestamp(header.unix_secs, header.unix_nsecs);
    let mut events = Vec::with_capacity(usize::from(header.count));
    for _ in 0..header.count {
        let (rest, record) = FlowRecord::parse_be(remaining)
            .map_err(|_| DecodeError::Truncated("netflow v5 flow record"))?;
        remaining = rest;

        let mut event = FlowEvent::new(timestamp, peer.ip(), &decoder.container);
        event.insert("version", FieldValue::UInt(header.version.into()));
        event.insert("flow_seq_num", FieldValue::UInt(header.flow_seq_num.into()));
        event.insert("engine_type", FieldValue::UInt(header.engine_type.into()));
        event.insert("engine_id", FieldValue::UInt(header.engine_id.into()));
        event.insert(
            "sampling_algorithm",
            FieldValue::UInt(header.sampling_algorithm().into()),
        );
        event.insert(
            "sampling_interval",
            FieldValue::UInt(header.sampling_interval().into()),
        );
        for (name, value) in record.fields() {
            let value = match value {
                FieldValue::UInt(v) if name.ends_with("_switched") => {
                    FieldValue::Str(switched_to_iso(&header, v))
                }
                other => other,
            };
            event.insert(name, value);
        }
        events.push(event);
    }
    Ok(events)
}

/// Converts a sysuptime-relative switched time to an absolute ISO-8601
/// string using the header's boot-relative clock.
fn switched_to_iso(header: &Header, value: u64) -> String {
    let millis = i64::from(header.sys_up_time) - value as i64;
    let mut seconds = i64::from(header.unix_secs) - millis.div_euclid(1000);
    let mut micros = i64::from(header.unix_nsecs) / 1000 - millis.rem_euclid(1000);
    if micros < 0 {
        seconds -= 1;
        micros += 1_000_000;
    }
    unix_micros_to_iso(seconds, micros)
}
