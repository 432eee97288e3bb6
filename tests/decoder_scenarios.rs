//! Cross-datagram decoder behavior: out-of-order templates, exporter
//! isolation and template rejection.

use netflow_collector::{CollectorConfig, Decoder, FieldValue};

use std::net::SocketAddr;

fn decoder() -> Decoder {
    Decoder::new(&CollectorConfig::new(2055)).unwrap()
}

fn v9_header(source_id: u32) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.extend_from_slice(&9u16.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&10_000u32.to_be_bytes()); // sys_up_time
    packet.extend_from_slice(&1_600_000_000u32.to_be_bytes()); // unix_secs
    packet.extend_from_slice(&1u32.to_be_bytes()); // flow_seq_num
    packet.extend_from_slice(&source_id.to_be_bytes());
    packet
}

fn v9_template_flowset(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&0u16.to_be_bytes());
    flowset.extend_from_slice(&((8 + fields.len() * 4) as u16).to_be_bytes());
    flowset.extend_from_slice(&template_id.to_be_bytes());
    flowset.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for (field_type, field_length) in fields {
        flowset.extend_from_slice(&field_type.to_be_bytes());
        flowset.extend_from_slice(&field_length.to_be_bytes());
    }
    flowset
}

fn data_flowset(flowset_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&flowset_id.to_be_bytes());
    flowset.extend_from_slice(&((4 + payload.len()) as u16).to_be_bytes());
    flowset.extend_from_slice(payload);
    flowset
}

fn ipfix_packet(observation_domain_id: u32, flowsets: &[Vec<u8>]) -> Vec<u8> {
    let body_len: usize = flowsets.iter().map(Vec::len).sum();
    let mut packet = Vec::new();
    packet.extend_from_slice(&10u16.to_be_bytes());
    packet.extend_from_slice(&((16 + body_len) as u16).to_be_bytes());
    packet.extend_from_slice(&1_600_000_100u32.to_be_bytes()); // export_time
    packet.extend_from_slice(&8u32.to_be_bytes()); // sequence_number
    packet.extend_from_slice(&observation_domain_id.to_be_bytes());
    for flowset in flowsets {
        packet.extend_from_slice(flowset);
    }
    packet
}

fn ipfix_template_flowset(template_id: u16, fields: &[(u16, u16)]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&template_id.to_be_bytes());
    body.extend_from_slice(&(fields.len() as u16).to_be_bytes());
    for (field_type, field_length) in fields {
        body.extend_from_slice(&field_type.to_be_bytes());
        body.extend_from_slice(&field_length.to_be_bytes());
    }
    let mut flowset = Vec::new();
    flowset.extend_from_slice(&2u16.to_be_bytes());
    flowset.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    flowset.extend_from_slice(&body);
    flowset
}

#[test]
fn test_data_before_template_recovers_once_learned() {
    let decoder = decoder();
    let exporter: SocketAddr = "192.0.2.1:2055".parse().unwrap();

    // Datagram 1: data for an unknown template. No events, one warning.
    let mut data_first = v9_header(0);
    data_first.extend_from_slice(&data_flowset(256, &[0, 0, 0, 100, 0, 0, 0, 10]));
    let events = decoder.decode(&data_first, exporter);
    assert!(events.is_empty());
    assert_eq!(decoder.metrics().missing_template, 1);
    assert_eq!(decoder.metrics().decode_failures, 0);

    // Datagram 2: the template arrives.
    let mut template = v9_header(0);
    template.extend_from_slice(&v9_template_flowset(256, &[(1, 4), (2, 4)]));
    assert!(decoder.decode(&template, exporter).is_empty());
    assert_eq!(decoder.metrics().templates_learned, 1);

    // Datagram 3: the same data now decodes.
    let events = decoder.decode(&data_first, exporter);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("in_bytes"), Some(&FieldValue::UInt(100)));
    assert_eq!(events[0].get("in_pkts"), Some(&FieldValue::UInt(10)));
}

#[test]
fn test_exporters_with_the_same_template_id_do_not_collide() {
    let decoder = decoder();
    let exporter_a: SocketAddr = "192.0.2.1:2055".parse().unwrap();
    let exporter_b: SocketAddr = "192.0.2.2:2055".parse().unwrap();

    // Both exporters use template id 256 with different layouts.
    let mut template_a = v9_header(0);
    template_a.extend_from_slice(&v9_template_flowset(256, &[(1, 4), (2, 4)]));
    decoder.decode(&template_a, exporter_a);

    let mut template_b = v9_header(0);
    template_b.extend_from_slice(&v9_template_flowset(256, &[(4, 1)]));
    decoder.decode(&template_b, exporter_b);

    // Exporter A's 8-byte records decode with A's layout.
    let mut data_a = v9_header(0);
    data_a.extend_from_slice(&data_flowset(256, &[0, 0, 0, 100, 0, 0, 0, 10]));
    let events = decoder.decode(&data_a, exporter_a);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("in_bytes"), Some(&FieldValue::UInt(100)));
    assert!(events[0].get("protocol").is_none());

    // Exporter B's 1-byte records decode with B's layout.
    let mut data_b = v9_header(0);
    data_b.extend_from_slice(&data_flowset(256, &[17]));
    let events = decoder.decode(&data_b, exporter_b);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("protocol"), Some(&FieldValue::UInt(17)));
    assert!(events[0].get("in_bytes").is_none());
}

#[test]
fn test_source_ids_on_one_host_do_not_collide() {
    let decoder = decoder();
    let exporter: SocketAddr = "192.0.2.1:2055".parse().unwrap();

    let mut template_a = v9_header(1);
    template_a.extend_from_slice(&v9_template_flowset(256, &[(1, 4)]));
    decoder.decode(&template_a, exporter);

    let mut template_b = v9_header(2);
    template_b.extend_from_slice(&v9_template_flowset(256, &[(4, 1)]));
    decoder.decode(&template_b, exporter);

    let mut data_b = v9_header(2);
    data_b.extend_from_slice(&data_flowset(256, &[6]));
    let events = decoder.decode(&data_b, exporter);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("protocol"), Some(&FieldValue::UInt(6)));

    let mut data_a = v9_header(1);
    data_a.extend_from_slice(&data_flowset(256, &[0, 0, 1, 0]));
    let events = decoder.decode(&data_a, exporter);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("in_bytes"), Some(&FieldValue::UInt(256)));
}

#[test]
fn test_ipfix_observation_domains_do_not_collide() {
    let decoder = decoder();
    let exporter: SocketAddr = "192.0.2.1:4739".parse().unwrap();

    let packet = ipfix_packet(1, &[ipfix_template_flowset(256, &[(1, 4)])]);
    decoder.decode(&packet, exporter);
    let packet = ipfix_packet(2, &[ipfix_template_flowset(256, &[(4, 1)])]);
    decoder.decode(&packet, exporter);

    let packet = ipfix_packet(1, &[data_flowset(256, &[0, 0, 0, 42])]);
    let events = decoder.decode(&packet, exporter);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("octetDeltaCount"), Some(&FieldValue::UInt(42)));

    let packet = ipfix_packet(2, &[data_flowset(256, &[6])]);
    let events = decoder.decode(&packet, exporter);
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].get("protocolIdentifier"),
        Some(&FieldValue::UInt(6))
    );
}

#[test]
fn test_variable_length_template_never_reaches_the_cache() {
    let decoder = decoder();
    let exporter: SocketAddr = "192.0.2.1:4739".parse().unwrap();

    let packet = ipfix_packet(1, &[ipfix_template_flowset(300, &[(1, 4), (82, 0xFFFF)])]);
    assert!(decoder.decode(&packet, exporter).is_empty());
    assert_eq!(decoder.metrics().templates_rejected, 1);
    assert!(decoder.template_cache().is_empty());

    // Later data flowsets referencing the rejected template keep missing.
    let packet = ipfix_packet(1, &[data_flowset(300, &[0, 0, 0, 1])]);
    assert!(decoder.decode(&packet, exporter).is_empty());
    assert_eq!(decoder.metrics().missing_template, 1);
}

#[test]
fn test_template_redefinition_replaces_the_layout() {
    let decoder = decoder();
    let exporter: SocketAddr = "192.0.2.1:2055".parse().unwrap();

    let mut template = v9_header(0);
    template.extend_from_slice(&v9_template_flowset(256, &[(1, 4), (2, 4)]));
    decoder.decode(&template, exporter);

    let mut redefined = v9_header(0);
    redefined.extend_from_slice(&v9_template_flowset(256, &[(4, 1)]));
    decoder.decode(&redefined, exporter);
    assert_eq!(decoder.template_cache().len(), 1);

    let mut data = v9_header(0);
    data.extend_from_slice(&data_flowset(256, &[6]));
    let events = decoder.decode(&data, exporter);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get("protocol"), Some(&FieldValue::UInt(6)));
}

#[test]
fn test_one_template_flowset_can_carry_several_templates() {
    let decoder = decoder();
    let exporter: SocketAddr = "192.0.2.1:2055".parse().unwrap();

    // Two templates back to back in one flowset; the second references an
    // unknown field type and is discarded without harming the first.
    let mut body = Vec::new();
    for (template_id, fields) in [(256u16, [(1u16, 4u16), (2, 4)]), (257, [(1, 4), (65000, 2)])] {
        body.extend_from_slice(&template_id.to_be_bytes());
        body.extend_from_slice(&(fields.len() as u16).to_be_bytes());
        for (field_type, field_length) in fields {
            body.extend_from_slice(&field_type.to_be_bytes());
            body.extend_from_slice(&field_length.to_be_bytes());
        }
    }
    let mut packet = v9_header(0);
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
    packet.extend_from_slice(&body);

    decoder.decode(&packet, exporter);
    assert_eq!(decoder.metrics().templates_learned, 1);
    assert_eq!(decoder.metrics().templates_rejected, 1);

    let mut data = v9_header(0);
    data.extend_from_slice(&data_flowset(256, &[0, 0, 0, 1, 0, 0, 0, 2]));
    assert_eq!(decoder.decode(&data, exporter).len(), 1);
}
