//! Field catalogs and the resolver that turns template declarations into
//! concrete decoders.
//!
//! Two catalogs exist: the NetFlow V9 catalog keyed by field type, and the
//! IPFIX catalog keyed by `(enterprise number, field type)` where enterprise
//! 0 is the IANA standard registry. Both load a default YAML source compiled
//! into the binary and may be augmented by a user supplied file whose keys
//! replace the defaults.

use crate::error::{Error, Result};
use crate::variable_versions::template::{CompiledField, Decode};

use log::warn;
use serde_yaml::Value;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Default NetFlow V9 field definitions, compiled into the binary.
pub const DEFAULT_NETFLOW_DEFINITIONS: &str = include_str!("../../definitions/netflow.yaml");
/// Default IPFIX field definitions, compiled into the binary.
pub const DEFAULT_IPFIX_DEFINITIONS: &str = include_str!("../../definitions/ipfix.yaml");

/// The IANA standard registry.
pub const IANA_ENTERPRISE: u32 = 0;

/// IPFIX variable-length field encoding (RFC 7011 section 7); not supported.
const VARIABLE_LENGTH: u16 = 0xFFFF;
/// basicList / subTemplateList / subTemplateMultiList (RFC 6313); not supported.
const STRUCTURED_DATA_TYPES: [u16; 3] = [291, 292, 293];

/// Semantic type of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned integer. `default_width` applies when the template declares
    /// length 0; any declared length of 1..=8 bytes overrides it.
    UInt { default_width: u8 },
    Ip4Addr,
    Ip6Addr,
    MacAddr,
    /// Fixed-length string of the declared length
    Str,
    /// Consume the declared length and discard
    Skip,
}

/// One immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub kind: FieldKind,
    /// Canonical event field name; empty for skip entries
    pub name: String,
}

/// NetFlow V9 field catalog: field type -> descriptor.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: HashMap<u16, FieldSpec>,
}

impl FieldCatalog {
    /// Loads the built-in definitions, then merges the optional override
    /// file (override keys replace defaults).
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut fields = parse_flat_source(DEFAULT_NETFLOW_DEFINITIONS)?;
        if let Some(path) = override_path {
            fields.extend(parse_flat_source(&read_override(path)?)?);
        }
        Ok(Self { fields })
    }

    /// Builds a catalog from a single YAML source, without the defaults.
    pub fn from_source(source: &str) -> Result<Self> {
        Ok(Self {
            fields: parse_flat_source(source)?,
        })
    }

    pub fn get(&self, field_type: u16) -> Option<&FieldSpec> {
        self.fields.get(&field_type)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves a template field declaration to its concrete decoder.
    /// `None` means the containing template must be rejected; a warning has
    /// already been logged.
    pub fn resolve(&self, field_type: u16, declared_length: u16) -> Option<CompiledField> {
        let Some(spec) = self.fields.get(&field_type) else {
            warn!(
                "unsupported netflow v9 field type {field_type} (length {declared_length}), rejecting template"
            );
            return None;
        };
        compile(spec, declared_length, "netflow v9", field_type)
    }
}

/// IPFIX field catalog: enterprise number -> field type -> descriptor.
#[derive(Debug, Clone, Default)]
pub struct IpfixCatalog {
    fields: HashMap<u32, HashMap<u16, FieldSpec>>,
}

impl IpfixCatalog {
    /// Loads the built-in definitions, then merges the optional override
    /// file (override keys replace defaults, per enterprise).
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut fields = parse_nested_source(DEFAULT_IPFIX_DEFINITIONS)?;
        if let Some(path) = override_path {
            for (enterprise, entries) in parse_nested_source(&read_override(path)?)? {
                fields.entry(enterprise).or_default().extend(entries);
            }
        }
        Ok(Self { fields })
    }

    /// Builds a catalog from a single YAML source, without the defaults.
    pub fn from_source(source: &str) -> Result<Self> {
        Ok(Self {
            fields: parse_nested_source(source)?,
        })
    }

    pub fn get(&self, enterprise: u32, field_type: u16) -> Option<&FieldSpec> {
        self.fields.get(&enterprise)?.get(&field_type)
    }

    /// Resolves an IPFIX field declaration. Variable-length encoding and the
    /// RFC 6313 structured types reject the template outright; otherwise the
    /// rules match [`FieldCatalog::resolve`].
    pub fn resolve(
        &self,
        enterprise: u32,
        field_type: u16,
        declared_length: u16,
    ) -> Option<CompiledField> {
        if declared_length == VARIABLE_LENGTH {
            warn!(
                "variable-length ipfix field type {field_type} (enterprise {enterprise}) is not supported, rejecting template"
            );
            return None;
        }
        if enterprise == IANA_ENTERPRISE && STRUCTURED_DATA_TYPES.contains(&field_type) {
            warn!(
                "structured-data ipfix field type {field_type} is not supported, rejecting template"
            );
            return None;
        }
        let Some(spec) = self.get(enterprise, field_type) else {
            warn!(
                "unsupported ipfix field type {field_type} (enterprise {enterprise}, length {declared_length}), rejecting template"
            );
            return None;
        };
        compile(spec, declared_length, "ipfix", field_type)
    }
}

/// Length-dependent rewrite of a catalog entry into a concrete decoder.
fn compile(
    spec: &FieldSpec,
    declared_length: u16,
    protocol: &str,
    field_type: u16,
) -> Option<CompiledField> {
    let length = usize::from(declared_length);
    match spec.kind {
        FieldKind::Skip => Some(CompiledField::skip(length)),
        FieldKind::Str => Some(CompiledField::new(&spec.name, Decode::Str(length))),
        FieldKind::UInt { default_width } => {
            let width = if length == 0 {
                usize::from(default_width)
            } else {
                length
            };
            if (1..=8).contains(&width) {
                Some(CompiledField::new(&spec.name, Decode::UInt(width)))
            } else {
                warn!(
                    "{protocol} field {} (type {field_type}) has unsupported integer width {width}, rejecting template",
                    spec.name
                );
                None
            }
        }
        FieldKind::Ip4Addr => fixed_width(spec, Decode::Ip4Addr, length, protocol, field_type),
        FieldKind::Ip6Addr => fixed_width(spec, Decode::Ip6Addr, length, protocol, field_type),
        FieldKind::MacAddr => fixed_width(spec, Decode::MacAddr, length, protocol, field_type),
    }
}

fn fixed_width(
    spec: &FieldSpec,
    decode: Decode,
    declared_length: usize,
    protocol: &str,
    field_type: u16,
) -> Option<CompiledField> {
    if declared_length == decode.width() {
        Some(CompiledField::new(&spec.name, decode))
    } else {
        warn!(
            "{protocol} field {} (type {field_type}) declared with length {declared_length}, expected {}, rejecting template",
            spec.name,
            decode.width()
        );
        None
    }
}

fn read_override(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::CatalogMissing(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

fn parse_flat_source(source: &str) -> Result<HashMap<u16, FieldSpec>> {
    let doc: HashMap<u16, Value> = serde_yaml::from_str(source)?;
    doc.into_iter()
        .map(|(field_type, value)| Ok((field_type, parse_entry(field_type, &value)?)))
        .collect()
}

fn parse_nested_source(source: &str) -> Result<HashMap<u32, HashMap<u16, FieldSpec>>> {
    let doc: HashMap<u32, HashMap<u16, Value>> = serde_yaml::from_str(source)?;
    doc.into_iter()
        .map(|(enterprise, entries)| {
            let entries = entries
                .into_iter()
                .map(|(field_type, value)| Ok((field_type, parse_entry(field_type, &value)?)))
                .collect::<Result<HashMap<_, _>>>()?;
            Ok((enterprise, entries))
        })
        .collect()
}

fn parse_entry(field_type: u16, value: &Value) -> Result<FieldSpec> {
    let entry = value
        .as_sequence()
        .ok_or_else(|| malformed(field_type, "expected a sequence"))?;
    match entry.as_slice() {
        [kind] => match kind.as_str() {
            Some("skip") => Ok(FieldSpec {
                kind: FieldKind::Skip,
                name: String::new(),
            }),
            _ => Err(malformed(field_type, "single-element entries must be [skip]")),
        },
        [kind, name] => {
            let name = name
                .as_str()
                .ok_or_else(|| malformed(field_type, "field name must be a string"))?
                .to_string();
            let kind = parse_kind(field_type, kind)?;
            Ok(FieldSpec { kind, name })
        }
        _ => Err(malformed(field_type, "expected one or two elements")),
    }
}

fn parse_kind(field_type: u16, kind: &Value) -> Result<FieldKind> {
    if let Some(width) = kind.as_u64() {
        if !(1..=8).contains(&width) {
            return Err(malformed(field_type, "default width must be 1..=8 bytes"));
        }
        return Ok(FieldKind::UInt {
            default_width: width as u8,
        });
    }
    let token = kind
        .as_str()
        .ok_or_else(|| malformed(field_type, "field kind must be a string or integer"))?;
    match token {
        "uint8" => Ok(FieldKind::UInt { default_width: 1 }),
        "uint16" => Ok(FieldKind::UInt { default_width: 2 }),
        "uint24" => Ok(FieldKind::UInt { default_width: 3 }),
        "uint32" => Ok(FieldKind::UInt { default_width: 4 }),
        "uint40" => Ok(FieldKind::UInt { default_width: 5 }),
        "uint48" => Ok(FieldKind::UInt { default_width: 6 }),
        "uint56" => Ok(FieldKind::UInt { default_width: 7 }),
        "uint64" => Ok(FieldKind::UInt { default_width: 8 }),
        "ip4_addr" => Ok(FieldKind::Ip4Addr),
        "ip6_addr" => Ok(FieldKind::Ip6Addr),
        "mac_addr" => Ok(FieldKind::MacAddr),
        "string" => Ok(FieldKind::Str),
        _ => Err(malformed(
            field_type,
            &format!("unknown field kind {token:?}"),
        )),
    }
}

fn malformed(field_type: u16, reason: &str) -> Error {
    Error::CatalogEntry {
        field_type,
        reason: reason.to_string(),
    }
}
