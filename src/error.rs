use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors surfaced during collector startup and shutdown.
///
/// Decode problems never appear here: a malformed datagram produces a
/// `_netflowdecodefailure` tagged event and is dropped, see [`DecodeError`].
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid collector configuration (bad bind address, port 0, empty or
    /// unknown version set, ...)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A user supplied field definition file does not exist
    #[error("field definition file not found: {0}")]
    CatalogMissing(PathBuf),

    /// A field definition source could not be parsed as YAML
    #[error("failed to parse field definitions: {0}")]
    CatalogSyntax(#[from] serde_yaml::Error),

    /// A field definition entry has an unknown shape
    #[error("malformed field definition for type {field_type}: {reason}")]
    CatalogEntry { field_type: u16, reason: String },

    /// Socket or definition file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a datagram could not be decoded.
///
/// These abort the current datagram only; the worker reports a single
/// decode-failure event and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ended before a complete structure could be read
    #[error("truncated packet while reading {0}")]
    Truncated(&'static str),

    /// A length field contradicts the surrounding framing
    #[error("invalid {context} length {length}")]
    BadLength { context: &'static str, length: usize },

    /// Version field outside the configured accept set
    #[error("unsupported netflow version {0}")]
    UnknownVersion(u16),
}
