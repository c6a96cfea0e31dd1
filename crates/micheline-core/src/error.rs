//! Error types for micheline-core
//!
//! This module defines the error conditions that can occur while decoding,
//! encoding, packing and unpacking Micheline trees. Every decoder in this crate
//! reports malformed input through [`MichelineError`] and never panics.

use std::fmt;

/// Errors that can occur while working with Micheline trees
///
/// Decoders are fed untrusted chain data, so each variant describes a
/// recoverable condition that is returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MichelineError {
    /// A decode step needed more bytes than the buffer holds
    ShortBuffer,
    /// An unrecognized node tag byte
    InvalidTag(u8),
    /// An unrecognized primitive byte
    UnknownOpcode(u8),
    /// An unrecognized primitive name
    UnknownPrimitive(String),
    /// A malformed or non-canonical integer
    InvalidInteger(String),
    /// A string literal that is not valid UTF-8
    InvalidString,
    /// An empty or non UTF-8 annotation
    InvalidAnnotation(String),
    /// A length prefix that does not match the payload
    InvalidLength(String),
    /// Nesting deeper than the configured limit
    DepthExceeded(usize),
    /// Bytes left over after a complete tree was decoded
    TrailingBytes(usize),
    /// A JSON document that does not follow the Micheline convention
    InvalidJson(String),
    /// Packed data could not be unpacked
    Unpack(String),
    /// Base58-check text could not be decoded
    Base58(String),
    /// Serialization error with error details
    Serialization(String),
}

impl fmt::Display for MichelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MichelineError::ShortBuffer => write!(f, "micheline: short buffer"),
            MichelineError::InvalidTag(tag) => write!(f, "micheline: invalid tag 0x{:02x}", tag),
            MichelineError::UnknownOpcode(code) => {
                write!(f, "Unknown michelson opcode 0x{:02x}", code)
            }
            MichelineError::UnknownPrimitive(name) => {
                write!(f, "Unknown michelson primitive {}", name)
            }
            MichelineError::InvalidInteger(msg) => write!(f, "micheline: invalid integer: {}", msg),
            MichelineError::InvalidString => write!(f, "micheline: string is not valid utf-8"),
            MichelineError::InvalidAnnotation(msg) => {
                write!(f, "micheline: invalid annotation: {}", msg)
            }
            MichelineError::InvalidLength(msg) => write!(f, "micheline: invalid length: {}", msg),
            MichelineError::DepthExceeded(max) => {
                write!(f, "micheline: nesting exceeds max depth {}", max)
            }
            MichelineError::TrailingBytes(n) => {
                write!(f, "micheline: {} unexpected extra trailer bytes", n)
            }
            MichelineError::InvalidJson(msg) => write!(f, "micheline: invalid json: {}", msg),
            MichelineError::Unpack(msg) => write!(f, "micheline: unpack failed: {}", msg),
            MichelineError::Base58(msg) => write!(f, "micheline: invalid base58: {}", msg),
            MichelineError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for MichelineError {}

impl From<serde_json::Error> for MichelineError {
    fn from(err: serde_json::Error) -> Self {
        MichelineError::Serialization(format!("{}", err))
    }
}

impl From<hex::FromHexError> for MichelineError {
    fn from(err: hex::FromHexError) -> Self {
        MichelineError::Serialization(format!("{}", err))
    }
}

/// Result type alias for Micheline operations
pub type Result<T> = std::result::Result<T, MichelineError>;
