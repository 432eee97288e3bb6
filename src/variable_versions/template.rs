//! Compiled record layouts.
//!
//! A template flowset declares an ordered list of `(field type, length)`
//! pairs. Resolving each pair against the field catalog produces a
//! [`CompiledField`]; the ordered sequence is a [`Template`], the run-time
//! binary decoder applied to every record of a matching data flowset.

use crate::event::FieldValue;

pub type TemplateId = u16;

/// How to consume one field from a record. The set of variants is closed;
/// a single driver loop interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decode {
    /// Big-endian unsigned integer of 1..=8 bytes
    UInt(usize),
    Ip4Addr,
    Ip6Addr,
    MacAddr,
    /// Fixed-length byte string, trailing NUL/space padding trimmed
    Str(usize),
    /// Consume and discard
    Skip(usize),
}

impl Decode {
    pub fn width(&self) -> usize {
        match self {
            Decode::UInt(w) | Decode::Str(w) | Decode::Skip(w) => *w,
            Decode::Ip4Addr => 4,
            Decode::Ip6Addr => 16,
            Decode::MacAddr => 6,
        }
    }
}

/// One resolved template field: the event field name plus its decoder.
/// Skip fields carry an empty name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledField {
    pub name: String,
    pub decode: Decode,
}

impl CompiledField {
    pub fn new(name: impl Into<String>, decode: Decode) -> Self {
        Self {
            name: name.into(),
            decode,
        }
    }

    pub fn skip(length: usize) -> Self {
        Self {
            name: String::new(),
            decode: Decode::Skip(length),
        }
    }
}

/// An ordered sequence of resolved fields with a fixed total record width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    fields: Vec<CompiledField>,
    width: usize,
}

impl Template {
    /// Compiles the resolved fields, preserving declaration order. Returns
    /// `None` for a template whose records would be zero bytes wide.
    pub fn new(fields: Vec<CompiledField>) -> Option<Self> {
        let width: usize = fields.iter().map(|f| f.decode.width()).sum();
        if width == 0 {
            return None;
        }
        Some(Self { fields, width })
    }

    /// Total record width in bytes (the sum of all declared field lengths).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Decodes a record of exactly [`Template::width`] bytes into ordered
    /// `(name, value)` pairs. Skip fields consume bytes but produce no pair.
    pub fn decode_record(&self, record: &[u8]) -> Vec<(&str, FieldValue)> {
        debug_assert_eq!(record.len(), self.width);
        let mut pairs = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for field in &self.fields {
            let width = field.decode.width();
            let bytes = &record[offset..offset + width];
            offset += width;
            let value = match field.decode {
                Decode::Skip(_) => continue,
                Decode::UInt(_) => FieldValue::UInt(be_uint(bytes)),
                Decode::Ip4Addr => {
                    FieldValue::Ip4Addr([bytes[0], bytes[1], bytes[2], bytes[3]].into())
                }
                Decode::Ip6Addr => FieldValue::Ip6Addr(be_uint128(bytes).into()),
                Decode::MacAddr => FieldValue::MacAddr(format_mac(bytes)),
                Decode::Str(_) => FieldValue::Str(
                    String::from_utf8_lossy(bytes)
                        .trim_end_matches(|c| c == '\0' || c == ' ')
                        .to_string(),
                ),
            };
            pairs.push((field.name.as_str(), value));
        }
        pairs
    }
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn be_uint128(bytes: &[u8]) -> u128 {
    bytes
        .iter()
        .fold(0u128, |acc, b| (acc << 8) | u128::from(*b))
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
